use super::constants::*;

pub(crate) fn log_level() -> Option<String> {
    Some("info".to_string())
}

pub(crate) fn endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

pub(crate) fn temp_id_prefix() -> String {
    TEMP_ID_PREFIX.to_string()
}

pub(crate) fn branch_name_prefix() -> String {
    BRANCH_NAME_PREFIX.to_string()
}

pub(crate) fn refresh_guard_ms() -> u64 {
    REFRESH_GUARD_MS
}
