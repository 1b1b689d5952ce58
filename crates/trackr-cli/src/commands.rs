//! 📜 One line of stdin, one command. NDJSON, tagged by `type`.
//!
//! ```text
//! {"type":"track","distinct_id":"abc123","event":"Login","properties":{"Age":33}}
//! {"type":"profile_unset","distinct_id":"abc123","keys":["Age"]}
//! ```

use serde::Deserialize;
use trackr::{Client, Properties};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Command {
    Track {
        distinct_id: String,
        event: String,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        is_login_id: bool,
    },
    TrackSignup {
        distinct_id: String,
        original_id: String,
        #[serde(default)]
        properties: Properties,
    },
    ProfileSet {
        distinct_id: String,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        is_login_id: bool,
    },
    ProfileSetOnce {
        distinct_id: String,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        is_login_id: bool,
    },
    ProfileIncrement {
        distinct_id: String,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        is_login_id: bool,
    },
    ProfileAppend {
        distinct_id: String,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        is_login_id: bool,
    },
    ProfileUnset {
        distinct_id: String,
        keys: Vec<String>,
        #[serde(default)]
        is_login_id: bool,
    },
    ProfileDelete {
        distinct_id: String,
        #[serde(default)]
        is_login_id: bool,
    },
}

impl Command {
    /// 🚀 Hands the command to the client. Validation and delivery errors come straight back.
    pub(crate) async fn apply(self, client: &mut Client) -> trackr::Result<()> {
        match self {
            Command::Track {
                distinct_id,
                event,
                properties,
                is_login_id,
            } => client.track(&distinct_id, &event, properties, is_login_id).await,
            Command::TrackSignup {
                distinct_id,
                original_id,
                properties,
            } => client.track_signup(&distinct_id, &original_id, properties).await,
            Command::ProfileSet {
                distinct_id,
                properties,
                is_login_id,
            } => client.profile_set(&distinct_id, properties, is_login_id).await,
            Command::ProfileSetOnce {
                distinct_id,
                properties,
                is_login_id,
            } => client.profile_set_once(&distinct_id, properties, is_login_id).await,
            Command::ProfileIncrement {
                distinct_id,
                properties,
                is_login_id,
            } => client.profile_increment(&distinct_id, properties, is_login_id).await,
            Command::ProfileAppend {
                distinct_id,
                properties,
                is_login_id,
            } => client.profile_append(&distinct_id, properties, is_login_id).await,
            Command::ProfileUnset {
                distinct_id,
                keys,
                is_login_id,
            } => client.profile_unset(&distinct_id, keys, is_login_id).await,
            Command::ProfileDelete {
                distinct_id,
                is_login_id,
            } => client.profile_delete(&distinct_id, is_login_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_a_track_line_parses() {
        let command: Command =
            serde_json::from_str(r#"{"type":"track","distinct_id":"abc123","event":"Login","properties":{"Age":33}}"#)
                .expect("💀 track line should parse");
        let Command::Track {
            distinct_id,
            event,
            properties,
            is_login_id,
        } = command
        else {
            panic!("💀 expected a track command");
        };
        assert_eq!(distinct_id, "abc123");
        assert_eq!(event, "Login");
        assert_eq!(properties.get("Age"), Some(&json!(33)));
        assert!(!is_login_id);
    }

    #[test]
    fn the_one_where_optional_bits_are_optional() {
        let command: Command = serde_json::from_str(r#"{"type":"profile_delete","distinct_id":"u1"}"#)
            .expect("💀 minimal delete should parse");
        assert_eq!(
            command,
            Command::ProfileDelete {
                distinct_id: "u1".into(),
                is_login_id: false
            }
        );
    }

    #[test]
    fn the_one_where_nonsense_is_refused() {
        assert!(serde_json::from_str::<Command>(r#"{"type":"teleport","distinct_id":"u1"}"#).is_err());
        assert!(serde_json::from_str::<Command>(r#"{"type":"track","distinct_id":"u1"}"#).is_err());
        assert!(serde_json::from_str::<Command>(r#"{"type":"profile_unset","distinct_id":"u1"}"#).is_err());
    }
}
