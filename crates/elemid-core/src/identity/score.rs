//! Stability score

use crate::types::ElementDescriptor;

/// Scores at or above this are trusted for long-lived bindings
pub const STABLE_THRESHOLD: f64 = 0.7;

/// Weighted estimate of how likely an id is to survive a rescan
pub fn stability_score(descriptor: &ElementDescriptor) -> f64 {
    let mut score: f64 = 0.0;
    if descriptor.primary().is_some() {
        score += 0.5;
    }
    if descriptor.path().is_some() {
        score += 0.3;
    }
    if !descriptor.element_type.trim().is_empty() {
        score += 0.1;
    }
    if descriptor.text_value().is_some() || descriptor.description_value().is_some() {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

pub fn is_stable(descriptor: &ElementDescriptor) -> bool {
    stability_score(descriptor) >= STABLE_THRESHOLD - f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_descriptor_scores_one() {
        let d = ElementDescriptor::new("app1", "1.0", "button")
            .with_primary_id("submit")
            .with_text("Submit")
            .with_path("/0/1");
        assert!((stability_score(&d) - 1.0).abs() < 1e-9);
        assert!(is_stable(&d));
    }

    #[test]
    fn test_path_and_text_without_primary_is_unstable() {
        let d = ElementDescriptor::new("app1", "1.0", "button")
            .with_text("Submit")
            .with_path("/0/1");
        assert!((stability_score(&d) - 0.5).abs() < 1e-9);
        assert!(!is_stable(&d));
    }

    #[test]
    fn test_primary_and_path_is_stable() {
        let d = ElementDescriptor::new("app1", "1.0", "")
            .with_primary_id("submit")
            .with_path("/0/1");
        assert!((stability_score(&d) - 0.8).abs() < 1e-9);
        assert!(is_stable(&d));
    }

    #[test]
    fn test_empty_descriptor_scores_zero() {
        let d = ElementDescriptor::default();
        assert_eq!(stability_score(&d), 0.0);
    }
}
