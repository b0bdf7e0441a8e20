use lazy_static::lazy_static;
use web_time::{SystemTime, UNIX_EPOCH};

lazy_static! {
    static ref LOCAL_HOST: String = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
}

/// Name of the machine this process runs on, resolved once.
pub fn local_host() -> &'static str {
    &LOCAL_HOST
}

/// Current time in whole seconds since the Unix epoch.
pub fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
