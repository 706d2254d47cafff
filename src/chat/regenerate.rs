//! Rollback planning for "regenerate last answer"
//!
//! Planning is pure: it only decides which message goes and which context
//! is resubmitted. The controller applies the plan.

use crate::providers::{ChatHistoryItem, Role};

/// What a regenerate should do to a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegeneratePlan {
    /// Index of the assistant message to drop, if there is one
    pub removed_index: Option<usize>,
    /// Context to resubmit, oldest first
    pub history: Vec<ChatHistoryItem>,
}

/// Plan a regenerate over `messages`
///
/// Returns `None` (nothing to do) when the conversation has no user message,
/// or when dropping the last assistant answer leaves no user message.
///
/// # Examples
///
/// ```
/// use streamchat::chat::plan_regenerate;
/// use streamchat::providers::{ChatHistoryItem, Role};
///
/// let messages = vec![
///     ChatHistoryItem::new(Role::User, "A"),
///     ChatHistoryItem::new(Role::Assistant, "B"),
///     ChatHistoryItem::new(Role::User, "C"),
/// ];
/// let plan = plan_regenerate(&messages).unwrap();
/// assert_eq!(plan.removed_index, Some(1));
/// let contents: Vec<&str> = plan.history.iter().map(|m| m.content.as_str()).collect();
/// assert_eq!(contents, ["A", "C"]);
/// ```
pub fn plan_regenerate(messages: &[ChatHistoryItem]) -> Option<RegeneratePlan> {
    if !messages.iter().any(|m| m.role == Role::User) {
        return None;
    }

    let removed_index = messages.iter().rposition(|m| m.role == Role::Assistant);
    let history: Vec<ChatHistoryItem> = messages
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != removed_index)
        .map(|(_, m)| m.clone())
        .collect();

    if !history.iter().any(|m| m.role == Role::User) {
        return None;
    }

    Some(RegeneratePlan {
        removed_index,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(items: &[(Role, &str)]) -> Vec<ChatHistoryItem> {
        items
            .iter()
            .map(|(role, text)| ChatHistoryItem::new(*role, *text))
            .collect()
    }

    fn contents(plan: &RegeneratePlan) -> Vec<&str> {
        plan.history.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_no_user_message_is_noop() {
        assert!(plan_regenerate(&[]).is_none());
        let only_assistant = msgs(&[(Role::System, "s"), (Role::Assistant, "hi")]);
        assert!(plan_regenerate(&only_assistant).is_none());
    }

    #[test]
    fn test_drops_trailing_answer() {
        let plan = plan_regenerate(&msgs(&[
            (Role::User, "A"),
            (Role::Assistant, "B"),
            (Role::User, "C"),
            (Role::Assistant, "D"),
        ]))
        .unwrap();
        assert_eq!(plan.removed_index, Some(3));
        assert_eq!(contents(&plan), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_last_assistant_before_trailing_user() {
        let plan = plan_regenerate(&msgs(&[
            (Role::User, "A"),
            (Role::Assistant, "B"),
            (Role::User, "C"),
        ]))
        .unwrap();
        assert_eq!(plan.removed_index, Some(1));
        assert_eq!(contents(&plan), vec!["A", "C"]);
    }

    #[test]
    fn test_unanswered_question_is_resubmitted_as_is() {
        let plan = plan_regenerate(&msgs(&[(Role::User, "A")])).unwrap();
        assert_eq!(plan.removed_index, None);
        assert_eq!(contents(&plan), vec!["A"]);
    }

    #[test]
    fn test_system_messages_are_kept() {
        let plan = plan_regenerate(&msgs(&[
            (Role::System, "rules"),
            (Role::User, "A"),
            (Role::Assistant, "B"),
        ]))
        .unwrap();
        assert_eq!(contents(&plan), vec!["rules", "A"]);
    }
}
