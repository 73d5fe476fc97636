//! Answers price and FAQ questions, whatever state the conversation is in.

use crate::snapshot::ContextSnapshot;
use crate::source::{KnowledgeSource, ProposalSink, SourceFault};
use parley_core::proposal::{ActionProposal, Priority};
use tracing::debug;

pub struct QuestionResponder;

impl KnowledgeSource for QuestionResponder {
    fn name(&self) -> &str {
        "question_responder"
    }

    fn should_contribute(&self, snapshot: &ContextSnapshot) -> bool {
        snapshot
            .graph()
            .sources()
            .questions
            .as_ref()
            .is_some_and(|q| q.enabled && snapshot.in_category(&q.category))
    }

    fn contribute(
        &self,
        snapshot: &ContextSnapshot,
        sink: &mut ProposalSink,
    ) -> Result<(), SourceFault> {
        let questions = snapshot
            .graph()
            .sources()
            .questions
            .as_ref()
            .ok_or_else(|| SourceFault::MissingSetting("sources.questions".into()))?;

        match questions.answer_for(&snapshot.intent) {
            Some(action) => sink.action(ActionProposal::new(
                action.clone(),
                Priority::High,
                "question_answered",
            )),
            None => debug!(intent = %snapshot.intent, "No answer configured for question"),
        }
        Ok(())
    }
}
