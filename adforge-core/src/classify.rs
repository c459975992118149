//! Classification of ad platform failures.
//!
//! Raw failures from the [`AdPlatformApi`](crate::api::AdPlatformApi) are
//! mapped onto a closed set of [`ErrorCategory`] values, each carrying the
//! message shown to the user and the [`RetryPolicy`] callers should follow.
//! The mapping is a pure function of the raw error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shown when the session must be re-established.
pub const EXPIRED_AUTH_MESSAGE: &str = "Session expired. Please login again.";

/// Message shown when the platform throttles the caller.
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit reached. Please try again later.";

/// Message shown when the token lacks a required permission.
pub const PERMISSION_DENIED_MESSAGE: &str = "Permission denied. Please check your access.";

/// A failure as reported by the ad platform or the transport beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawProviderError {
    /// The platform answered with an error envelope.
    #[error("provider error {code}: {message}")]
    Api {
        code: i64,
        subcode: Option<i64>,
        message: String,
        status: Option<u16>,
    },

    /// Non-success HTTP status without a parseable error envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {message}")]
    Network { message: String },

    /// A success response whose body could not be decoded.
    #[error("malformed response: {message}")]
    Decode { message: String },
}

impl RawProviderError {
    /// Shorthand for an error envelope without subcode or status.
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            subcode: None,
            message: message.into(),
            status: None,
        }
    }

    /// The provider- or transport-supplied message.
    pub fn message(&self) -> &str {
        match self {
            Self::Api { message, .. }
            | Self::Http { message, .. }
            | Self::Network { message }
            | Self::Decode { message } => message,
        }
    }

    /// The platform error code, when the failure came from an error envelope.
    pub fn provider_code(&self) -> Option<ProviderCode> {
        match self {
            Self::Api { code, .. } => Some(ProviderCode::from(*code)),
            _ => None,
        }
    }
}

/// Platform error codes the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCode {
    /// 190 (invalid or expired OAuth token), 102 (session invalid).
    InvalidToken,
    /// 4: application-level request limit.
    AppRateLimit,
    /// 17 (user request limit), 613 (custom rate limit).
    UserRateLimit,
    /// 10 and the 200-299 permission range.
    PermissionDenied,
    /// Any other code.
    Unrecognized(i64),
}

impl From<i64> for ProviderCode {
    fn from(code: i64) -> Self {
        match code {
            102 | 190 => Self::InvalidToken,
            4 => Self::AppRateLimit,
            17 | 613 => Self::UserRateLimit,
            10 | 200..=299 => Self::PermissionDenied,
            other => Self::Unrecognized(other),
        }
    }
}

/// Application-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    ExpiredAuth,
    RateLimited,
    PermissionDenied,
    Transient,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExpiredAuth => "ExpiredAuth",
            Self::RateLimited => "RateLimited",
            Self::PermissionDenied => "PermissionDenied",
            Self::Transient => "Transient",
        };
        f.write_str(name)
    }
}

/// What a caller should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Retrying will not help.
    None,
    /// Retry after a delay.
    Backoff,
    /// The user must log in again.
    ReauthRequired,
}

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{category}: {user_message}")]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub user_message: String,
    pub retry_policy: RetryPolicy,
}

impl ErrorClassification {
    /// The session is gone or was never established.
    pub fn expired_auth() -> Self {
        Self {
            category: ErrorCategory::ExpiredAuth,
            user_message: EXPIRED_AUTH_MESSAGE.to_string(),
            retry_policy: RetryPolicy::ReauthRequired,
        }
    }

    /// The platform is throttling requests.
    pub fn rate_limited() -> Self {
        Self {
            category: ErrorCategory::RateLimited,
            user_message: RATE_LIMITED_MESSAGE.to_string(),
            retry_policy: RetryPolicy::Backoff,
        }
    }

    /// The token lacks a permission.
    pub fn permission_denied() -> Self {
        Self {
            category: ErrorCategory::PermissionDenied,
            user_message: PERMISSION_DENIED_MESSAGE.to_string(),
            retry_policy: RetryPolicy::None,
        }
    }

    /// Anything else; the raw message is passed through.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Transient,
            user_message: message.into(),
            retry_policy: RetryPolicy::Backoff,
        }
    }

    /// Whether the caller should send the user back to login.
    pub fn requires_reauth(&self) -> bool {
        self.retry_policy == RetryPolicy::ReauthRequired
    }

    /// Suggested wait before retrying, for [`RetryPolicy::Backoff`].
    pub fn suggested_delay(&self) -> Option<Duration> {
        match (self.retry_policy, self.category) {
            (RetryPolicy::Backoff, ErrorCategory::RateLimited) => Some(Duration::from_secs(60)),
            (RetryPolicy::Backoff, _) => Some(Duration::from_secs(5)),
            (RetryPolicy::None | RetryPolicy::ReauthRequired, _) => None,
        }
    }
}

/// Map a raw failure onto its classification.
pub fn classify(raw: &RawProviderError) -> ErrorClassification {
    let Some(code) = raw.provider_code() else {
        return ErrorClassification::transient(raw.message());
    };

    match code {
        ProviderCode::InvalidToken => ErrorClassification::expired_auth(),
        ProviderCode::AppRateLimit | ProviderCode::UserRateLimit => {
            ErrorClassification::rate_limited()
        }
        ProviderCode::PermissionDenied => ErrorClassification::permission_denied(),
        ProviderCode::Unrecognized(_) => ErrorClassification::transient(raw.message()),
    }
}
