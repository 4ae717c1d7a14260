//src/composition.rs

/// Fraction of `G`/`C` bases (either case) among the characters of `seq`.
/// An empty sequence is 0.0.
pub fn gc_fraction(seq: &str) -> f64 {
    let seq = seq.trim();
    let mut len = 0usize;
    let mut gc = 0usize;
    for c in seq.chars() {
        len += 1;
        if matches!(c, 'G' | 'C' | 'g' | 'c') {
            gc += 1;
        }
    }
    if len == 0 {
        return 0.0;
    }
    gc as f64 / len as f64
}
