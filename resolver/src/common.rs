use reqwest::{StatusCode, header::HeaderValue};
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_LOG_LEN: usize = 300;

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

pub fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    let value = value?.to_str().ok()?.trim();
    let secs = value.parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

pub fn next_backoff(backoff: Duration) -> Duration {
    (backoff + backoff).min(MAX_BACKOFF)
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_LOG_LEN) {
        None => trimmed.to_string(),
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn retry_after_accepts_seconds_only() {
        let secs = HeaderValue::from_static(" 7 ");
        assert_eq!(parse_retry_after(Some(&secs)), Some(Duration::from_secs(7)));

        let date = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&date)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(45)), MAX_BACKOFF);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_LOG_LEN + 10);
        let out = truncate_for_log(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_LOG_LEN + 3);

        assert_eq!(truncate_for_log("  short  "), "short");
    }
}
