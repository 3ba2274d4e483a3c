use semver::Version;

use crate::metadata::InternalData;

/// Outcome of comparing our API version against a peer's.
///
/// Version differences are never grounds for rejecting a message; callers
/// log the comparison and carry on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionComparison {
    /// The peer sent no metadata, so its version is unknown.
    UnknownSender,
    /// Versions are identical.
    Match,
    /// Versions differ only in minor/patch components.
    MinorDifference { ours: String, theirs: String },
    /// Major versions differ; payload schemas may be incompatible.
    MajorDifference { ours: String, theirs: String },
    /// One of the versions is not a parseable semver string.
    Unparseable { ours: String, theirs: String },
}

impl VersionComparison {
    /// Compare our own metadata against what a peer attached to an envelope.
    pub fn check(ours: &InternalData, theirs: Option<&InternalData>) -> Self {
        let Some(theirs) = theirs else {
            return VersionComparison::UnknownSender;
        };
        if ours.api_version() == theirs.api_version() {
            return VersionComparison::Match;
        }

        let our_version = ours.api_version().to_string();
        let their_version = theirs.api_version().to_string();
        match (Version::parse(&our_version), Version::parse(&their_version)) {
            (Ok(a), Ok(b)) if a.major != b.major => VersionComparison::MajorDifference {
                ours: our_version,
                theirs: their_version,
            },
            (Ok(_), Ok(_)) => VersionComparison::MinorDifference {
                ours: our_version,
                theirs: their_version,
            },
            _ => VersionComparison::Unparseable {
                ours: our_version,
                theirs: their_version,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(version: &str) -> InternalData {
        InternalData::new(version, "com.example.peer")
    }

    #[test]
    fn absent_sender_is_unknown() {
        assert_eq!(
            VersionComparison::check(&data("1.0.0"), None),
            VersionComparison::UnknownSender
        );
    }

    #[test]
    fn identical_versions_match() {
        assert_eq!(
            VersionComparison::check(&data("1.2.3"), Some(&data("1.2.3"))),
            VersionComparison::Match
        );
    }

    #[test]
    fn minor_and_major_differences_are_distinguished() {
        assert!(matches!(
            VersionComparison::check(&data("1.2.3"), Some(&data("1.4.0"))),
            VersionComparison::MinorDifference { .. }
        ));
        assert!(matches!(
            VersionComparison::check(&data("1.2.3"), Some(&data("2.0.0"))),
            VersionComparison::MajorDifference { .. }
        ));
    }

    #[test]
    fn unparseable_versions_are_reported_not_rejected() {
        assert!(matches!(
            VersionComparison::check(&data("1.2.3"), Some(&data("banana"))),
            VersionComparison::Unparseable { .. }
        ));
    }
}
