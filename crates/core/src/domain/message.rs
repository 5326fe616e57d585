use serde::{Deserialize, Serialize};

/// One persisted unit of conversation history.
///
/// `ts` is the Slack event timestamp (`"1722527938.123456"`). It is treated as
/// an opaque string that sorts lexicographically in arrival order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub user: String,
    pub ts: String,
    pub channel: String,
}

impl ChatMessage {
    pub fn new(
        text: impl Into<String>,
        user: impl Into<String>,
        ts: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self { text: text.into(), user: user.into(), ts: ts.into(), channel: channel.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unsupported sort order `{other}` (expected asc|desc)")),
        }
    }
}
