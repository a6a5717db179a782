//! Language packs.
//!
//! Everything locale-specific about a lesson lives here: the recognition
//! lexicon, the words used to read numbers and operators aloud, the spoken
//! phrases and the status lines shown to the learner. Templates use
//! `{placeholder}` markers filled in by [`crate::phrasing::render`].

use crate::lexicon::Lexicon;

/// Words used when reading an arithmetic expression aloud.
#[derive(Debug, Clone, Copy)]
pub struct OperatorWords {
    pub plus: &'static str,
    pub minus: &'static str,
    pub times: &'static str,
    pub divided_by: &'static str,
    pub equals: &'static str,
}

/// Spoken phrases and status lines for one language.
#[derive(Debug, Clone, Copy)]
pub struct Phrases {
    pub greeting: &'static str,
    pub correct: &'static str,
    /// `{solution}`: the question read aloud with its answer.
    pub incorrect: &'static str,
    pub retry: &'static str,
    /// `{total}`, `{incorrect}`.
    pub summary: &'static str,
    pub corrections_intro: &'static str,
    pub replay: &'static str,
    pub next_level: &'static str,
    pub finished: &'static str,

    pub status_idle: &'static str,
    pub status_starting: &'static str,
    /// `{expression}`.
    pub status_question: &'static str,
    pub status_unrecognized: &'static str,
    /// `{expression}`, `{answer}`.
    pub status_correct: &'static str,
    /// `{expression}`, `{answer}`.
    pub status_incorrect: &'static str,
    pub status_finished: &'static str,
    pub status_stopped: &'static str,
    pub status_unsupported: &'static str,
    /// `{error}`.
    pub status_error: &'static str,
    /// `{error}`.
    pub status_question_error: &'static str,
}

#[derive(Debug)]
pub struct LanguagePack {
    /// Short code used in configuration, e.g. `ru`.
    pub code: &'static str,
    /// BCP 47 tag handed to the speech engines, e.g. `ru-RU`.
    pub tts_locale: &'static str,
    /// Lower-case fragment looked for in voice names when no voice matches by tag.
    pub voice_name_hint: &'static str,
    pub lexicon: Lexicon,
    /// Canonical spoken form for 0..=20, indexed by value.
    pub number_words: &'static [&'static str],
    pub operators: OperatorWords,
    pub phrases: Phrases,
}

/// Every pack the drill can run in.
pub static SUPPORTED_PACKS: [&LanguagePack; 2] = [&RUSSIAN, &HEBREW];

impl LanguagePack {
    /// Finds a pack by its short code or full locale tag.
    pub fn from_code(code: &str) -> Option<&'static LanguagePack> {
        let code = code.trim().to_lowercase();
        SUPPORTED_PACKS
            .iter()
            .copied()
            .find(|pack| pack.code == code || pack.tts_locale.to_lowercase() == code)
    }

    /// Primary language subtag of the locale (`ru` for `ru-RU`).
    pub fn language_prefix(&self) -> &'static str {
        self.tts_locale
            .split('-')
            .next()
            .unwrap_or(self.tts_locale)
    }

    /// Spoken form of `value`, falling back to the numeral outside 0..=20.
    pub fn number_word(&self, value: i64) -> String {
        usize::try_from(value)
            .ok()
            .and_then(|index| self.number_words.get(index))
            .map(|word| (*word).to_string())
            .unwrap_or_else(|| value.to_string())
    }
}

pub static RUSSIAN: LanguagePack = LanguagePack {
    code: "ru",
    tts_locale: "ru-RU",
    voice_name_hint: "russian",
    // Compounds are declared before the words they contain so that
    // containment matching reaches them first.
    lexicon: Lexicon::new(&[
        ("двадцать", 20),
        ("девятнадцать", 19),
        ("восемнадцать", 18),
        ("семнадцать", 17),
        ("шестнадцать", 16),
        ("пятнадцать", 15),
        ("четырнадцать", 14),
        ("тринадцать", 13),
        ("двенадцать", 12),
        ("одиннадцать", 11),
        ("десять", 10),
        ("девять", 9),
        ("восемь", 8),
        ("семь", 7),
        ("шесть", 6),
        ("пять", 5),
        ("четыре", 4),
        ("три", 3),
        ("два", 2),
        ("две", 2),
        ("один", 1),
        ("одна", 1),
        ("одно", 1),
        ("ноль", 0),
        ("нуль", 0),
    ]),
    number_words: &[
        "ноль",
        "один",
        "два",
        "три",
        "четыре",
        "пять",
        "шесть",
        "семь",
        "восемь",
        "девять",
        "десять",
        "одиннадцать",
        "двенадцать",
        "тринадцать",
        "четырнадцать",
        "пятнадцать",
        "шестнадцать",
        "семнадцать",
        "восемнадцать",
        "девятнадцать",
        "двадцать",
    ],
    operators: OperatorWords {
        plus: "плюс",
        minus: "минус",
        times: "умножить на",
        divided_by: "разделить на",
        equals: "равно",
    },
    phrases: Phrases {
        greeting: "Привет! Давайте решать примеры.",
        correct: "Правильно!",
        incorrect: "Неправильно. Правильный ответ: {solution}",
        retry: "Не удалось распознать ответ. Повторите, пожалуйста.",
        summary: "Всего было {total} вопросов, неправильных ответов: {incorrect}",
        corrections_intro: "Правильные ответы: ",
        replay: "Повторяем.",
        next_level: "Переходим к следующему уровню.",
        finished: "Ты хорошо поработал!",
        status_idle: "Нажмите \"Начать\" для запуска",
        status_starting: "Начинаем урок...",
        status_question: "Вопрос: {expression} = ?",
        status_unrecognized: "Не удалось распознать ответ. Попробуйте еще раз.",
        status_correct: "Правильно! {expression} = {answer}",
        status_incorrect: "Неправильно. {expression} = {answer}",
        status_finished: "Урок завершен! Ты хорошо поработал!",
        status_stopped: "Урок остановлен",
        status_unsupported: "Голосовые функции не поддерживаются в этом браузере",
        status_error: "Ошибка: {error}",
        status_question_error: "Ошибка при обработке вопроса: {error}",
    },
};

pub static HEBREW: LanguagePack = LanguagePack {
    code: "he",
    tts_locale: "he-IL",
    voice_name_hint: "hebrew",
    lexicon: Lexicon::new(&[
        ("אפס", 0),
        ("אחד", 1),
        ("שניים", 2),
        ("שתיים", 2),
        ("שלוש", 3),
        ("שלושה", 3),
        ("אַרבע", 4),
        ("ארבע", 4),
        ("ארבעה", 4),
        ("חמש", 5),
        ("חמישה", 5),
        ("שש", 6),
        ("שישה", 6),
        ("שבע", 7),
        ("שבעה", 7),
        ("שמונה", 8),
        ("תשע", 9),
        ("תשעה", 9),
        ("עשר", 10),
        ("עשרה", 10),
        ("אחת עשרה", 11),
        ("אחד עשר", 11),
        ("שתיים עשרה", 12),
        ("שניים עשר", 12),
        ("שלוש עשרה", 13),
        ("שלושה עשר", 13),
        ("ארבע עשרה", 14),
        ("ארבעה עשר", 14),
        ("חמש עשרה", 15),
        ("חמישה עשר", 15),
        ("שש עשרה", 16),
        ("שישה עשר", 16),
        ("שבע עשרה", 17),
        ("שבעה עשר", 17),
        ("שמונה עשרה", 18),
        ("שמונה עשר", 18),
        ("תשע עשרה", 19),
        ("תשעה עשר", 19),
        ("עשרים", 20),
    ]),
    number_words: &[
        "אפס",
        "אחד",
        "שניים",
        "שלוש",
        "אַרבע",
        "חמש",
        "שש",
        "שבע",
        "שמונה",
        "תשע",
        "עשר",
        "אחת עשרה",
        "שתיים עשרה",
        "שלוש עשרה",
        "ארבע עשרה",
        "חמש עשרה",
        "שש עשרה",
        "שבע עשרה",
        "שמונה עשרה",
        "תשע עשרה",
        "עשרים",
    ],
    operators: OperatorWords {
        plus: "פלוס",
        minus: "מינוס",
        times: "כפול",
        divided_by: "חלקי",
        equals: "שווה",
    },
    phrases: Phrases {
        greeting: "שלום! בוא נפתור תרגילים.",
        correct: "נכון!",
        incorrect: "לא נכון. התשובה הנכונה: {solution}",
        retry: "לא הצלחתי להבין את התשובה. חזור בבקשה.",
        summary: "היו {total} שאלות, תשובות שגויות: {incorrect}",
        corrections_intro: "התשובות הנכונות הן: ",
        replay: "חוזרים שוב.",
        next_level: "עוברים לשלב הבא.",
        finished: "עבדת טוב!",
        status_idle: "לחץ על \"התחל\" כדי להתחיל",
        status_starting: "מתחילים את השיעור...",
        status_question: "שאלה: {expression} = ?",
        status_unrecognized: "לא הצלחתי לזהות את התשובה. נסה שוב.",
        status_correct: "נכון! {expression} = {answer}",
        status_incorrect: "לא נכון. {expression} = {answer}",
        status_finished: "השיעור הסתיים! עבדת טוב!",
        status_stopped: "השיעור הופסק",
        status_unsupported: "פונקציות קוליות אינן נתמכות בדפדפן זה",
        status_error: "שגיאה: {error}",
        status_question_error: "שגיאה בעיבוד השאלה: {error}",
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_are_found_by_code_or_locale() {
        assert_eq!(LanguagePack::from_code("ru").map(|p| p.code), Some("ru"));
        assert_eq!(LanguagePack::from_code("he-IL").map(|p| p.code), Some("he"));
        assert_eq!(LanguagePack::from_code(" RU-ru ").map(|p| p.code), Some("ru"));
        assert!(LanguagePack::from_code("fr").is_none());
    }

    #[test]
    fn every_pack_reads_all_numbers_aloud() {
        for pack in SUPPORTED_PACKS {
            assert_eq!(pack.number_words.len(), 21, "pack {}", pack.code);
            assert_eq!(pack.number_word(25), "25");
            assert_eq!(pack.number_word(-1), "-1");
        }
    }

    #[test]
    fn every_spoken_number_word_parses_back() {
        for pack in SUPPORTED_PACKS {
            for (value, word) in pack.number_words.iter().enumerate() {
                assert_eq!(
                    pack.lexicon.parse(word),
                    Some(value as i64),
                    "pack {} word {}",
                    pack.code,
                    word
                );
            }
        }
    }

    #[test]
    fn russian_words_parse() {
        let lexicon = RUSSIAN.lexicon;
        assert_eq!(lexicon.parse("семь"), Some(7));
        assert_eq!(lexicon.parse("Две"), Some(2));
        assert_eq!(lexicon.parse("7"), Some(7));
        assert_eq!(lexicon.parse("xyz"), None);
        assert_eq!(lexicon.parse("25"), None);
    }

    #[test]
    fn russian_containment_prefers_compounds() {
        let lexicon = RUSSIAN.lexicon;
        assert_eq!(lexicon.parse("ответ восемь"), Some(8));
        assert_eq!(lexicon.parse("наверное одиннадцать"), Some(11));
        assert_eq!(lexicon.parse("двадцать да"), Some(20));
    }

    #[test]
    fn hebrew_words_parse() {
        let lexicon = HEBREW.lexicon;
        assert_eq!(lexicon.parse("שבע"), Some(7));
        assert_eq!(lexicon.parse("אפס"), Some(0));
        assert_eq!(lexicon.parse("שתיים עשרה"), Some(12));
    }

    #[test]
    fn language_prefix_is_primary_subtag() {
        assert_eq!(RUSSIAN.language_prefix(), "ru");
        assert_eq!(HEBREW.language_prefix(), "he");
    }
}
