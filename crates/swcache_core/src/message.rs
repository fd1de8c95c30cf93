use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Messages a host can post to the running manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Run an eviction sweep now.
    CleanupCache,
    /// Delete every partition.
    ClearCache,
    /// Client-side compression capabilities.
    CompressionSupport {
        #[serde(default, deserialize_with = "lenient_support")]
        support: CompressionSupport,
    },
}

impl ControlMessage {
    /// `None` for anything that is not a known message.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice(raw).ok()
    }
}

/// Reported capabilities. Any JSON value is accepted per flag and read by
/// truthiness; missing flags and a non-object payload count as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionSupport {
    pub gzip: bool,
    pub br: bool,
    pub deflate: bool,
}

impl CompressionSupport {
    fn from_value(value: &Value) -> Self {
        let flag = |name: &str| value.get(name).is_some_and(truthy);
        Self {
            gzip: flag("gzip"),
            br: flag("br"),
            deflate: flag("deflate"),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lenient_support<'de, D>(deserializer: D) -> Result<CompressionSupport, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(CompressionSupport::from_value(&value))
}

#[cfg(test)]
mod tests {
    use super::{CompressionSupport, ControlMessage};

    #[test]
    fn parses_known_messages() {
        assert_eq!(
            ControlMessage::parse(br#"{"type":"CLEANUP_CACHE"}"#),
            Some(ControlMessage::CleanupCache)
        );
        assert_eq!(
            ControlMessage::parse(br#"{"type":"CLEAR_CACHE","extra":1}"#),
            Some(ControlMessage::ClearCache)
        );
        assert_eq!(
            ControlMessage::parse(
                br#"{"type":"COMPRESSION_SUPPORT","support":{"gzip":true,"br":true,"zstd":true}}"#
            ),
            Some(ControlMessage::CompressionSupport {
                support: CompressionSupport {
                    gzip: true,
                    br: true,
                    deflate: false,
                }
            })
        );
    }

    #[test]
    fn compression_flags_are_read_one_by_one() {
        assert_eq!(
            ControlMessage::parse(
                br#"{"type":"COMPRESSION_SUPPORT","support":{"gzip":"yes","br":0,"deflate":1}}"#
            ),
            Some(ControlMessage::CompressionSupport {
                support: CompressionSupport {
                    gzip: true,
                    br: false,
                    deflate: true,
                }
            })
        );
        assert_eq!(
            ControlMessage::parse(br#"{"type":"COMPRESSION_SUPPORT","support":"gzip"}"#),
            Some(ControlMessage::CompressionSupport {
                support: CompressionSupport::default()
            })
        );
        assert_eq!(
            ControlMessage::parse(br#"{"type":"COMPRESSION_SUPPORT"}"#),
            Some(ControlMessage::CompressionSupport {
                support: CompressionSupport::default()
            })
        );
    }

    #[test]
    fn ignores_malformed_messages() {
        assert_eq!(ControlMessage::parse(b"not json"), None);
        assert_eq!(ControlMessage::parse(br#"{"type":"SELF_DESTRUCT"}"#), None);
        assert_eq!(ControlMessage::parse(br#"{"kind":"CLEAR_CACHE"}"#), None);
        assert_eq!(ControlMessage::parse(b"null"), None);
    }
}
