pub mod shutdown;

#[macro_export]
macro_rules! inboxd_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! after_n_days_timestamp {
    ($start_ts:expr, $days:expr) => {{
        const MILLIS_PER_DAY: i64 = 86_400_000;
        $start_ts + ($days as i64) * MILLIS_PER_DAY
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::InboxError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

/// Packs a vector of f32 into a little-endian byte blob, per spec.md §3
/// ("little-endian packed 32-bit floats of fixed length D").
pub fn pack_embedding(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn unpack_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `sum(a·b) / (‖a‖·‖b‖)`, returning 0 for zero-norm inputs (spec.md §4.1).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Translates a `*`-glob pattern into a case-insensitive anchored regex,
/// per spec.md §4.10 ("Patterns use `*` glob with case-insensitive
/// matching and are translated to regex on use").
pub fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut out = String::from("(?i)^");
    for part in pattern.split('*') {
        out.push_str(&regex::escape(part));
        out.push_str(".*");
    }
    // trailing ".*" added once too many; trim it back off unless pattern
    // actually ended in '*'.
    if !pattern.ends_with('*') {
        out.truncate(out.len() - 2);
    }
    out.push('$');
    regex::Regex::new(&out).unwrap_or_else(|_| regex::Regex::new("$^").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_roundtrip() {
        let v = vec![1.0f32, -2.5, 0.0, 3.25];
        let packed = pack_embedding(&v);
        assert_eq!(packed.len(), 16);
        assert_eq!(unpack_embedding(&packed), v);
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn glob_star_matches_anywhere() {
        let re = glob_to_regex("*cfo*");
        assert!(re.is_match("cfo@acme.com"));
        assert!(re.is_match("CFO@ACME.COM"));
        assert!(!re.is_match("ceo@acme.com"));
    }

    #[test]
    fn glob_without_star_is_exact() {
        let re = glob_to_regex("budget");
        assert!(re.is_match("budget"));
        assert!(!re.is_match("budget review"));
    }
}
