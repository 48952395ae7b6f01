//! Ordered text deltas as delivered by the shared text.

use loro::event::{Diff, DiffEvent};
use loro::{ContainerID, TextDelta};
use smol_str::SmolStr;

use crate::CollabError;

/// One step of a text delta, applied left to right with a running index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    /// Skip `n` chars.
    Retain(usize),
    /// Insert text at the running index.
    Insert(SmolStr),
    /// Remove `n` chars at the running index.
    Delete(usize),
}

impl Delta {
    /// Length in chars this step covers in the text after the change.
    pub fn output_len(&self) -> usize {
        match self {
            Delta::Retain(n) => *n,
            Delta::Insert(text) => text.chars().count(),
            Delta::Delete(_) => 0,
        }
    }
}

impl TryFrom<&TextDelta> for Delta {
    type Error = CollabError;

    fn try_from(delta: &TextDelta) -> Result<Self, Self::Error> {
        match delta {
            TextDelta::Retain { retain, .. } => Ok(Delta::Retain(*retain)),
            TextDelta::Insert { insert, .. } => Ok(Delta::Insert(SmolStr::new(insert))),
            TextDelta::Delete { delete } => Ok(Delta::Delete(*delete)),
            #[allow(unreachable_patterns)]
            other => Err(CollabError::UnexpectedDelta(format!("{other:?}"))),
        }
    }
}

/// A change to the shared text: ordered deltas plus the commit origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    pub deltas: Vec<Delta>,
    /// Origin tag of the commit that produced this change. Empty for
    /// untagged commits.
    pub origin: SmolStr,
}

/// Pull the text changes for `target` out of a Loro event.
pub(crate) fn text_changes(
    event: &DiffEvent<'_>,
    target: &ContainerID,
) -> Vec<Result<TextChange, CollabError>> {
    event
        .events
        .iter()
        .filter(|container| container.target == target)
        .map(|container| match &container.diff {
            Diff::Text(deltas) => {
                let deltas = deltas
                    .iter()
                    .map(Delta::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TextChange {
                    deltas,
                    origin: SmolStr::new(event.origin),
                })
            }
            other => Err(CollabError::UnexpectedDelta(format!(
                "non-text diff for text container: {other:?}"
            ))),
        })
        .collect()
}

/// Apply deltas to a plain string. Used to check translator output.
#[cfg(test)]
pub(crate) fn apply_to_string(text: &str, deltas: &[Delta]) -> Result<String, CollabError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    for delta in deltas {
        match delta {
            Delta::Retain(n) => {
                let end = index + n;
                let kept = chars
                    .get(index..end)
                    .ok_or_else(|| CollabError::UnexpectedDelta(format!("retain {n} past end")))?;
                out.extend(kept);
                index = end;
            }
            Delta::Insert(inserted) => out.push_str(inserted),
            Delta::Delete(n) => {
                if index + n > chars.len() {
                    return Err(CollabError::UnexpectedDelta(format!("delete {n} past end")));
                }
                index += n;
            }
        }
    }
    out.extend(&chars[index.min(chars.len())..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro::ContainerType;
    use loro::EventTriggerKind;
    use loro::event::ContainerDiff;

    #[test]
    fn test_from_loro_delta() {
        let retain = TextDelta::Retain {
            retain: 3,
            attributes: None,
        };
        let insert = TextDelta::Insert {
            insert: "xyz".to_string(),
            attributes: None,
        };
        let delete = TextDelta::Delete { delete: 2 };

        assert_eq!(Delta::try_from(&retain).unwrap(), Delta::Retain(3));
        assert_eq!(Delta::try_from(&insert).unwrap(), Delta::Insert("xyz".into()));
        assert_eq!(Delta::try_from(&delete).unwrap(), Delta::Delete(2));
    }

    #[test]
    fn test_apply_to_string() {
        let deltas = vec![
            Delta::Retain(1),
            Delta::Delete(2),
            Delta::Insert("XY".into()),
            Delta::Retain(1),
        ];
        assert_eq!(apply_to_string("abcde", &deltas).unwrap(), "aXYde");
    }

    #[test]
    fn test_apply_to_string_rejects_overrun() {
        assert!(apply_to_string("ab", &[Delta::Retain(5)]).is_err());
        assert!(apply_to_string("ab", &[Delta::Retain(1), Delta::Delete(4)]).is_err());
    }

    fn event<'a>(origin: &'a str, events: Vec<ContainerDiff<'a>>) -> DiffEvent<'a> {
        DiffEvent {
            triggered_by: EventTriggerKind::Import,
            origin,
            current_target: None,
            events,
        }
    }

    #[test]
    fn test_text_changes_keep_target_only() {
        let target = ContainerID::new_root("content", ContainerType::Text);
        let other = ContainerID::new_root("notes", ContainerType::Text);
        let inserted = vec![TextDelta::Insert {
            insert: "hi".to_string(),
            attributes: None,
        }];
        let diffs = vec![
            ContainerDiff {
                target: &other,
                path: &[],
                is_unknown: false,
                diff: Diff::Text(inserted.clone()),
            },
            ContainerDiff {
                target: &target,
                path: &[],
                is_unknown: false,
                diff: Diff::Text(inserted),
            },
        ];

        let changes = text_changes(&event("remote", diffs), &target);
        assert_eq!(changes.len(), 1);
        let change = changes[0].as_ref().unwrap();
        assert_eq!(change.origin, "remote");
        assert_eq!(change.deltas, vec![Delta::Insert("hi".into())]);
    }

    #[test]
    fn test_non_text_diff_is_fatal() {
        let target = ContainerID::new_root("content", ContainerType::Text);
        let diffs = vec![ContainerDiff {
            target: &target,
            path: &[],
            is_unknown: false,
            diff: Diff::List(Vec::new()),
        }];

        let changes = text_changes(&event("remote", diffs), &target);
        assert!(matches!(
            changes.as_slice(),
            [Err(CollabError::UnexpectedDelta(_))]
        ));
    }

    #[test]
    fn test_output_len() {
        assert_eq!(Delta::Insert("🌍a".into()).output_len(), 2);
        assert_eq!(Delta::Delete(4).output_len(), 0);
    }
}
