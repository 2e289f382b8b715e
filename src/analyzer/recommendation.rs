//! Recommendations per issue type

use super::issue::{IssueType, PerformanceIssue};

/// Guidance for a triggered issue type
pub fn recommendations_for(issue_type: IssueType) -> &'static [&'static str] {
    match issue_type {
        IssueType::Render => &[
            "Batch DOM writes and read layout properties only after all writes",
            "Avoid forcing synchronous layout inside loops",
            "Promote animated elements to their own layer with transform/opacity",
        ],
        IssueType::Script => &[
            "Split long-running work into chunks scheduled across frames",
            "Cache results of expensive computations",
            "Defer non-critical scripts until after first render",
        ],
        IssueType::Dom => &[
            "Insert nodes through a document fragment instead of one by one",
            "Reuse elements from a pool rather than creating new ones",
            "Keep the document tree shallow and prune detached nodes",
        ],
        IssueType::Memory => &[
            "Release pooled objects after use so they can be recycled",
            "Remove event listeners and references from detached elements",
            "Bound history buffers and caches",
        ],
        IssueType::Event => &[
            "Delegate events to a common ancestor instead of per-element listeners",
            "Debounce or throttle high-frequency handlers (scroll, resize, input)",
            "Move heavy handler work off the input path",
        ],
    }
}

/// Generic guidance for the legacy engine profile
pub const LEGACY_ENGINE_GUIDANCE: &[&str] = &[
    "Legacy engine detected: minimise layout reads between DOM writes",
    "Legacy engine detected: prefer classic event attachment and avoid per-node closures",
    "Legacy engine detected: keep polyfill work out of hot paths",
];

/// Builds the recommendation list for a report
///
/// Each issue type contributes its guidance once, in the order issues appear.
pub fn build_recommendations(issues: &[PerformanceIssue], legacy_engine: bool) -> Vec<String> {
    let mut seen: Vec<IssueType> = Vec::new();
    let mut out = Vec::new();

    for issue in issues {
        if seen.contains(&issue.issue_type) {
            continue;
        }
        seen.push(issue.issue_type);
        out.extend(
            recommendations_for(issue.issue_type)
                .iter()
                .map(|s| s.to_string()),
        );
    }

    if legacy_engine {
        out.extend(LEGACY_ENGINE_GUIDANCE.iter().map(|s| s.to_string()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::issue::IssueSeverity;

    fn issue(issue_type: IssueType) -> PerformanceIssue {
        PerformanceIssue {
            issue_type,
            severity: IssueSeverity::High,
            description: String::new(),
            impact: String::new(),
            measurement: 0.0,
            threshold: 0.0,
        }
    }

    #[test]
    fn test_no_issues_no_recommendations() {
        assert!(build_recommendations(&[], false).is_empty());
    }

    #[test]
    fn test_each_type_contributes_once() {
        let recs = build_recommendations(&[issue(IssueType::Dom), issue(IssueType::Dom)], false);
        assert_eq!(recs.len(), recommendations_for(IssueType::Dom).len());
    }

    #[test]
    fn test_legacy_guidance_appended() {
        let recs = build_recommendations(&[issue(IssueType::Event)], true);
        assert!(recs.last().unwrap().starts_with("Legacy engine detected"));
        assert_eq!(
            recs.len(),
            recommendations_for(IssueType::Event).len() + LEGACY_ENGINE_GUIDANCE.len()
        );
    }
}
