//! Cosine similarity over embedding vectors.

/// Cosine similarity of two vectors: dot product over the product of L2
/// norms, in [-1, 1]. Returns 0.0 when either norm is zero or the lengths
/// differ.
#[must_use]
pub fn cosine(u: &[f32], v: &[f32]) -> f32 {
    if u.len() != v.len() || u.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_u = 0.0f64;
    let mut norm_v = 0.0f64;
    for (a, b) in u.iter().zip(v.iter()) {
        let a = f64::from(*a);
        let b = f64::from(*b);
        dot += a * b;
        norm_u += a * a;
        norm_v += b * b;
    }
    if norm_u == 0.0 || norm_v == 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_u.sqrt() * norm_v.sqrt());
    sim.clamp(-1.0, 1.0) as f32
}
