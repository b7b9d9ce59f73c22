use thiserror::Error;

/// Failure while fetching or decoding an external feed.
///
/// Storage failures are not represented here; they travel as `sqlx::Error`
/// inside `anyhow::Error`.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not parse {what}: {message}")]
    Parse { what: &'static str, message: String },
    #[error("{what} returned no entries")]
    Empty { what: String },
}

impl FeedError {
    pub fn parse(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            what,
            message: err.to_string(),
        }
    }

    /// Taxonomy label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } | Self::Status { .. } => "transport",
            Self::Parse { .. } | Self::Empty { .. } => "parse",
        }
    }
}

pub(crate) fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(FeedError::parse("csv", "bad quote").kind(), "parse");
        assert_eq!(
            FeedError::Empty {
                what: "map feed".into()
            }
            .kind(),
            "parse"
        );
        let status = FeedError::Status {
            url: "http://x".into(),
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert_eq!(status.kind(), "transport");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = truncate_for_log("ééééé".to_string(), 3);
        assert_eq!(s, "é…");
        assert_eq!(truncate_for_log("short".into(), 10), "short");
    }
}
