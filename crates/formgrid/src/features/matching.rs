//! Descriptor matching: Hamming cross-check and L2 ratio test.

use super::brief::BinaryDescriptor;
use super::patch::FloatDescriptor;

/// A correspondence between a reference and a target descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    /// Index into the reference feature set.
    pub reference: usize,
    /// Index into the target feature set.
    pub target: usize,
    /// Descriptor distance (Hamming or L2, per strategy).
    pub distance: f32,
}

/// Exhaustive Hamming matching with mutual best-match consistency.
///
/// A pair survives only if each descriptor is the other's nearest
/// neighbour. Survivors are sorted ascending by distance and truncated to
/// `max_matches`, discarding the long low-quality tail.
pub fn match_binary_cross_check(
    reference: &[BinaryDescriptor],
    target: &[BinaryDescriptor],
    max_matches: usize,
) -> Vec<FeatureMatch> {
    if reference.is_empty() || target.is_empty() {
        return Vec::new();
    }

    let forward: Vec<usize> = reference
        .iter()
        .map(|d| nearest_binary(d, target).0)
        .collect();
    let backward: Vec<usize> = target
        .iter()
        .map(|d| nearest_binary(d, reference).0)
        .collect();

    let mut matches: Vec<FeatureMatch> = forward
        .iter()
        .enumerate()
        .filter(|&(r, &t)| backward[t] == r)
        .map(|(r, &t)| FeatureMatch {
            reference: r,
            target: t,
            distance: reference[r].distance(&target[t]) as f32,
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.reference, a.target).cmp(&(b.reference, b.target)))
    });
    matches.truncate(max_matches);
    matches
}

fn nearest_binary(query: &BinaryDescriptor, candidates: &[BinaryDescriptor]) -> (usize, u32) {
    let mut best = (0usize, u32::MAX);
    for (i, c) in candidates.iter().enumerate() {
        let d = query.distance(c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// Brute-force 2-NN matching under L2 with Lowe's ratio test.
///
/// A match is accepted only when the best distance is strictly below
/// `ratio` times the second-best, which rejects ambiguous
/// correspondences. Fewer than two target descriptors cannot pass the
/// test, so the result is empty.
pub fn match_float_ratio(
    reference: &[FloatDescriptor],
    target: &[FloatDescriptor],
    ratio: f32,
) -> Vec<FeatureMatch> {
    if target.len() < 2 {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for (r, q) in reference.iter().enumerate() {
        let mut best = (0usize, f32::INFINITY);
        let mut second = f32::INFINITY;
        for (t, c) in target.iter().enumerate() {
            let d = q.distance(c);
            if d < best.1 {
                second = best.1;
                best = (t, d);
            } else if d < second {
                second = d;
            }
        }
        if best.1 < ratio * second {
            matches.push(FeatureMatch {
                reference: r,
                target: best.0,
                distance: best.1,
            });
        }
    }
    matches
}
