//! Question bank and session state machine.
//!
//! A [`Session`] is one pass through a tier's fixed question bank. Every
//! transition returns a new value; the previous session is never modified.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors emitted by session transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session already completed")]
    Completed,
}

/// A fixed difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
pub enum Tier {
    One,
    Two,
}

impl Tier {
    pub fn number(self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
        }
    }

    /// The tier a learner is promoted to after a perfect pass, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::One => Some(Tier::Two),
            Tier::Two => None,
        }
    }

    pub fn bank(self) -> &'static [QuestionTemplate] {
        match self {
            Tier::One => &TIER_ONE_BANK,
            Tier::Two => &TIER_TWO_BANK,
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.number()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A build-time question: expression text and its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionTemplate {
    pub expression: &'static str,
    pub answer: i64,
}

const fn template(expression: &'static str, answer: i64) -> QuestionTemplate {
    QuestionTemplate { expression, answer }
}

// Adding one.
const TIER_ONE_BANK: [QuestionTemplate; 5] = [
    template("2 + 1", 3),
    template("5 + 1", 6),
    template("7 + 1", 8),
    template("3 + 1", 4),
    template("9 + 1", 10),
];

// Adding two.
const TIER_TWO_BANK: [QuestionTemplate; 5] = [
    template("2 + 2", 4),
    template("5 + 2", 7),
    template("7 + 2", 9),
    template("4 + 2", 6),
    template("9 + 2", 11),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    /// `<tier>-<ordinal>`, ordinals starting at 1.
    pub id: String,
    pub expression: String,
    pub correct_answer: i64,
    pub user_answer: Option<i64>,
    pub is_correct: Option<bool>,
}

impl Question {
    fn from_template(tier: Tier, ordinal: usize, template: &QuestionTemplate) -> Self {
        Self {
            id: format!("{}-{}", tier.number(), ordinal),
            expression: template.expression.to_string(),
            correct_answer: template.answer,
            user_answer: None,
            is_correct: None,
        }
    }

    /// Grades `answer` against this question, returning the answered copy.
    pub fn validate_answer(&self, answer: i64) -> Question {
        Question {
            user_answer: Some(answer),
            is_correct: Some(answer == self.correct_answer),
            ..self.clone()
        }
    }

    pub fn is_answered(&self) -> bool {
        self.user_answer.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    current_tier: Tier,
    questions: Vec<Question>,
    current_question_index: usize,
    errors: Vec<Question>,
    is_complete: bool,
}

impl Session {
    /// Builds a fresh session from `tier`'s bank, in bank order.
    pub fn new(tier: Tier) -> Self {
        let questions: Vec<Question> = tier
            .bank()
            .iter()
            .enumerate()
            .map(|(index, template)| Question::from_template(tier, index + 1, template))
            .collect();
        let is_complete = questions.is_empty();
        Self {
            current_tier: tier,
            questions,
            current_question_index: 0,
            errors: Vec::new(),
            is_complete,
        }
    }

    pub fn tier(&self) -> Tier {
        self.current_tier
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn errors(&self) -> &[Question] {
        &self.errors
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// The question awaiting an answer, or `None` once the pass is over.
    pub fn next_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    /// The most recently graded question.
    pub fn last_answered(&self) -> Option<&Question> {
        self.current_question_index
            .checked_sub(1)
            .and_then(|index| self.questions.get(index))
    }

    /// Questions answered so far, in presentation order.
    pub fn answered(&self) -> &[Question] {
        &self.questions[..self.current_question_index]
    }

    /// Grades `answer` for the current question and advances by one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` when every question is already answered.
    pub fn process_answer(&self, answer: i64) -> Result<Session, SessionError> {
        let index = self.current_question_index;
        let graded = self
            .questions
            .get(index)
            .ok_or(SessionError::Completed)?
            .validate_answer(answer);

        let mut questions = self.questions.clone();
        let mut errors = self.errors.clone();
        if graded.is_correct == Some(false) {
            errors.push(graded.clone());
        }
        questions[index] = graded;

        let next_index = index + 1;
        Ok(Session {
            current_tier: self.current_tier,
            is_complete: next_index >= questions.len(),
            questions,
            current_question_index: next_index,
            errors,
        })
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            tier: self.current_tier,
            total_questions: self.questions.len(),
            incorrect_count: self.errors.len(),
            errors: self.errors.clone(),
        }
    }
}

/// What follows a finished pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Replay the whole tier after at least one mistake.
    Replay(Tier),
    /// Perfect pass; move up to the given tier.
    Promote(Tier),
    /// Perfect pass on the last tier.
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub tier: Tier,
    pub total_questions: usize,
    pub incorrect_count: usize,
    pub errors: Vec<Question>,
}

impl SessionSummary {
    /// A tier is only left after a pass with no mistakes.
    pub fn next_step(&self) -> NextStep {
        if self.incorrect_count > 0 {
            return NextStep::Replay(self.tier);
        }
        match self.tier.next() {
            Some(next) => NextStep::Promote(next),
            None => NextStep::Finish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer_all(mut session: Session, answers: &[i64]) -> Session {
        for answer in answers {
            session = session.process_answer(*answer).unwrap();
        }
        session
    }

    fn correct_answers(tier: Tier) -> Vec<i64> {
        tier.bank().iter().map(|t| t.answer).collect()
    }

    #[test]
    fn new_sessions_start_fresh() {
        for tier in [Tier::One, Tier::Two] {
            let session = Session::new(tier);
            assert_eq!(session.questions().len(), 5);
            assert_eq!(session.current_question_index(), 0);
            assert!(session.errors().is_empty());
            assert!(!session.is_complete());
            assert_eq!(session.tier(), tier);
            assert!(session.questions().iter().all(|q| !q.is_answered()));
        }
    }

    #[test]
    fn question_ids_follow_tier_and_ordinal() {
        let session = Session::new(Tier::Two);
        let ids: Vec<&str> = session.questions().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, ["2-1", "2-2", "2-3", "2-4", "2-5"]);
        assert_eq!(session.questions()[4].expression, "9 + 2");
        assert_eq!(session.questions()[4].correct_answer, 11);
    }

    #[test]
    fn next_question_is_current_slot() {
        let session = Session::new(Tier::One);
        assert_eq!(session.next_question().map(|q| q.id.as_str()), Some("1-1"));

        let finished = answer_all(session, &correct_answers(Tier::One));
        assert!(finished.next_question().is_none());
    }

    #[test]
    fn every_answer_advances_by_one() {
        let session = Session::new(Tier::One);
        for answer in [3, 42, -1] {
            let next = session.process_answer(answer).unwrap();
            assert_eq!(next.current_question_index(), session.current_question_index() + 1);
        }
    }

    #[test]
    fn correct_answer_is_marked_correct() {
        let session = Session::new(Tier::One).process_answer(3).unwrap();
        let next = session.process_answer(6).unwrap();
        assert_eq!(next.questions()[1].is_correct, Some(true));
        assert_eq!(next.questions()[1].user_answer, Some(6));
        assert!(next.errors().is_empty());
    }

    #[test]
    fn processing_leaves_the_previous_session_untouched() {
        let session = Session::new(Tier::One);
        let before = session.clone();
        let _ = session.process_answer(1).unwrap();
        assert_eq!(session, before);
    }

    #[test]
    fn answered_prefix_matches_index() {
        let session = answer_all(Session::new(Tier::One), &[3, 0]);
        for (index, question) in session.questions().iter().enumerate() {
            assert_eq!(question.is_answered(), index < session.current_question_index());
        }
        assert_eq!(session.answered().len(), 2);
        assert_eq!(session.last_answered().map(|q| q.id.as_str()), Some("1-2"));
    }

    #[test]
    fn completes_exactly_at_the_last_answer() {
        let mut session = Session::new(Tier::Two);
        for answer in correct_answers(Tier::Two) {
            assert!(!session.is_complete());
            session = session.process_answer(answer).unwrap();
        }
        assert!(session.is_complete());
        assert_eq!(session.current_question_index(), session.questions().len());
    }

    #[test]
    fn answering_past_completion_is_an_error() {
        let session = answer_all(Session::new(Tier::One), &correct_answers(Tier::One));
        assert_eq!(session.process_answer(3), Err(SessionError::Completed));
    }

    #[test]
    fn errors_keep_answer_order() {
        let session = answer_all(Session::new(Tier::One), &[3, 7, 8, 0, 1]);
        let wrong: Vec<&str> = session.errors().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(wrong, ["1-2", "1-4", "1-5"]);

        let expected: Vec<&Question> = session
            .questions()
            .iter()
            .filter(|q| q.user_answer != Some(q.correct_answer))
            .collect();
        assert_eq!(session.errors().iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn perfect_first_tier_promotes() {
        let session = answer_all(Session::new(Tier::One), &correct_answers(Tier::One));
        let summary = session.summary();
        assert!(session.is_complete());
        assert_eq!(summary.total_questions, 5);
        assert_eq!(summary.incorrect_count, 0);
        assert_eq!(summary.next_step(), NextStep::Promote(Tier::Two));
    }

    #[test]
    fn one_mistake_replays_the_whole_tier() {
        let session = answer_all(Session::new(Tier::One), &[3, 6, 9, 4, 10]);
        let summary = session.summary();
        assert_eq!(session.errors().len(), 1);
        assert_eq!(summary.next_step(), NextStep::Replay(Tier::One));

        let NextStep::Replay(tier) = summary.next_step() else {
            panic!("expected replay");
        };
        let replay = Session::new(tier);
        assert_eq!(replay.tier(), Tier::One);
        assert_eq!(replay.questions().len(), 5);
        assert!(replay.questions().iter().all(|q| !q.is_answered()));
    }

    #[test]
    fn perfect_last_tier_finishes() {
        let session = answer_all(Session::new(Tier::Two), &correct_answers(Tier::Two));
        assert_eq!(session.summary().next_step(), NextStep::Finish);
    }
}
