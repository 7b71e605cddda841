/// Lua script for the daily quota bucket.
///
/// Atomically increments the bucket and sets its expiry on creation, so two
/// instances racing on a fresh day cannot write conflicting expiries: only
/// the caller that observes count == 1 sets the TTL. The TTL itself is
/// computed by the caller (seconds until the next UTC midnight) so the clock
/// stays injectable.
///
/// KEYS[1] = the quota bucket key
/// ARGV[1] = seconds until the bucket should expire
///
/// Returns: [count after increment, remaining TTL]
pub const DAILY_QUOTA_SCRIPT: &str = r#"
local key = KEYS[1]
local expiry = tonumber(ARGV[1])

local count = redis.call('INCR', key)

-- Set expiry on the increment that created the bucket
if count == 1 then
    redis.call('EXPIRE', key, expiry)
end

local ttl = redis.call('TTL', key)
if ttl == -1 then
    -- Expiry never landed (crash between INCR and EXPIRE); repair it
    redis.call('EXPIRE', key, expiry)
    ttl = expiry
end

return {count, ttl}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_shape() {
        assert!(DAILY_QUOTA_SCRIPT.contains("INCR"));
        assert!(DAILY_QUOTA_SCRIPT.contains("EXPIRE"));
        assert!(DAILY_QUOTA_SCRIPT.contains("TTL"));
    }
}
