//! Lua scripts for atomic cache operations.

/// Delete a key only if it still holds the expected value.
///
/// Arguments:
/// - KEYS[1]: Entry key (e.g., `login_code:{namespace}:{subject}`)
/// - ARGV[1]: Value the caller read and validated
///
/// Returns:
/// - 1: Deleted (caller consumed the entry)
/// - 0: Missing or replaced since it was read
pub const COMPARE_AND_DELETE: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
"#;
