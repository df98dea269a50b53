//! Messages pushed to observers.

use serde::Serialize;

/// One message on an observer's push channel.
///
/// Serializes internally tagged, e.g. `{"type":"batch","lines":["d"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TailMessage {
    /// The backlog at subscribe time; always the first message an observer sees.
    Snapshot { lines: Vec<String> },
    /// Newly completed lines, in file order.
    Batch { lines: Vec<String> },
    /// The file shrank; `lines` is the backlog rebuilt from what remains.
    Reset { lines: Vec<String> },
    /// The observer fell behind and `missed` messages were dropped here.
    Gap { missed: usize },
    /// The file can no longer be read; the stream is paused, not closed.
    Stalled { reason: String },
    /// The file is readable again after a stall.
    Resumed,
}

impl TailMessage {
    /// Lines carried by the message, if any.
    pub fn lines(&self) -> Option<&[String]> {
        match self {
            TailMessage::Snapshot { lines }
            | TailMessage::Batch { lines }
            | TailMessage::Reset { lines } => Some(lines),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shapes() {
        let batch = TailMessage::Batch {
            lines: vec!["d".to_string()],
        };
        assert_eq!(batch.to_json().unwrap(), r#"{"type":"batch","lines":["d"]}"#);

        let snapshot = TailMessage::Snapshot { lines: Vec::new() };
        assert_eq!(snapshot.to_json().unwrap(), r#"{"type":"snapshot","lines":[]}"#);

        let gap = TailMessage::Gap { missed: 3 };
        assert_eq!(gap.to_json().unwrap(), r#"{"type":"gap","missed":3}"#);

        assert_eq!(TailMessage::Resumed.to_json().unwrap(), r#"{"type":"resumed"}"#);
    }

    #[test]
    fn test_lines_accessor() {
        let reset = TailMessage::Reset {
            lines: vec!["x".to_string()],
        };
        assert_eq!(reset.lines(), Some(&["x".to_string()][..]));
        assert_eq!(TailMessage::Gap { missed: 1 }.lines(), None);
        assert_eq!(
            TailMessage::Stalled {
                reason: "gone".to_string()
            }
            .lines(),
            None
        );
    }
}
