// Errors are split in the same way as the rest of the crate: the internal
// crate reports problems with `&'static str` and we wrap those here.
//
// The taxonomy roughly follows the life-cycle of a calculation:
// 1. configuration problems are detected while constructing a config or at
//    the start of a `process*` call, before any traversal work starts.
// 2. combining results (`+=`) can fail when the binning doesn't match.
// 3. covariance estimation can fail when the required patch results are
//    missing.
// Problems encountered during the traversal itself (zero separations, NaN
// angles) are never errors, those contributions are simply skipped.

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The underlying internal error type
#[non_exhaustive]
#[derive(Clone, Debug)]
enum ErrorKind {
    /// A problem with the binning of a single axis (e.g. the "3 of 4" rule)
    BinSpec(BinSpecError),
    /// A parameter has a bad value
    Parameter(ParameterError),
    /// An unknown name was given for a choice parameter
    Choice(ChoiceError),
    /// An incompatible combination of metric, coordinates and units
    MetricCoords(MetricCoordsError),
    /// Mismatched patch counts between catalogs
    PatchCount(PatchCountError),
    /// Arrays handed to a point-set constructor are inconsistent
    InputShape(InputShapeError),
    /// Two correlation objects can't be combined
    Incompatible(IncompatibleError),
    /// Covariance estimation can't proceed
    Covariance(CovarianceError),
    /// A communicator failed to deliver a message
    Comm(CommError),
    /// Problems reading or writing results
    Serialization(SerializationError),
    /// Wraps the stringly errors from `npcorr_nostd_internal`
    Internal(InternalError),
}

// define constructor methods for Error
impl Error {
    /// produce an error describing a problem with the binning of an axis
    pub(crate) fn bin_spec(who: &str, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::BinSpec(BinSpecError {
                who: who.to_string(),
                what: what.into(),
            }),
        }
    }

    /// produce an error indicating that a named parameter has a bad value
    pub(crate) fn parameter(name: &str, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Parameter(ParameterError {
                name: name.to_string(),
                what: what.into(),
            }),
        }
    }

    /// produce an error indicating that an unknown name was specified
    pub(crate) fn choice(what: &'static str, actual: &str, choices: &'static [&'static str]) -> Self {
        Error {
            kind: ErrorKind::Choice(ChoiceError {
                what,
                actual: actual.to_string(),
                choices,
            }),
        }
    }

    pub(crate) fn metric_coords(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::MetricCoords(MetricCoordsError { what: what.into() }),
        }
    }

    pub(crate) fn patch_count(npatch: Vec<usize>) -> Self {
        Error {
            kind: ErrorKind::PatchCount(PatchCountError { npatch }),
        }
    }

    pub(crate) fn input_shape(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::InputShape(InputShapeError { what: what.into() }),
        }
    }

    pub(crate) fn incompatible(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Incompatible(IncompatibleError { what: what.into() }),
        }
    }

    pub(crate) fn covariance(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Covariance(CovarianceError { what: what.into() }),
        }
    }

    pub(crate) fn comm(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Comm(CommError { what: what.into() }),
        }
    }

    pub(crate) fn serialization(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Serialization(SerializationError { what: what.into() }),
        }
    }

    /// wraps an error string from `npcorr_nostd_internal`
    pub(crate) fn internal(message: &'static str) -> Self {
        Error {
            kind: ErrorKind::Internal(InternalError(message)),
        }
    }

    /// Whether this is a configuration error (always raised before any
    /// traversal work begins)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::BinSpec(_)
                | ErrorKind::Parameter(_)
                | ErrorKind::Choice(_)
                | ErrorKind::MetricCoords(_)
                | ErrorKind::PatchCount(_)
                | ErrorKind::InputShape(_)
        )
    }

    /// Whether this error came from combining incompatible results
    pub fn is_incompatible(&self) -> bool {
        matches!(self.kind, ErrorKind::Incompatible(_))
    }

    /// Whether this error came from covariance estimation
    pub fn is_covariance(&self) -> bool {
        matches!(self.kind, ErrorKind::Covariance(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            ErrorKind::BinSpec(ref err) => err.fmt(f),
            ErrorKind::Parameter(ref err) => err.fmt(f),
            ErrorKind::Choice(ref err) => err.fmt(f),
            ErrorKind::MetricCoords(ref err) => err.fmt(f),
            ErrorKind::PatchCount(ref err) => err.fmt(f),
            ErrorKind::InputShape(ref err) => err.fmt(f),
            ErrorKind::Incompatible(ref err) => err.fmt(f),
            ErrorKind::Covariance(ref err) => err.fmt(f),
            ErrorKind::Comm(ref err) => err.fmt(f),
            ErrorKind::Serialization(ref err) => err.fmt(f),
            ErrorKind::Internal(ref err) => err.fmt(f),
        }
    }
}

#[derive(Clone, Debug)]
struct BinSpecError {
    who: String,
    what: String,
}

impl core::fmt::Display for BinSpecError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let who = self.who.as_str();
        let what = self.what.as_str();
        write!(f, "problem with {who} binning: {what}")
    }
}

#[derive(Clone, Debug)]
struct ParameterError {
    name: String,
    what: String,
}

impl core::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let ParameterError { name, what } = self;
        write!(f, "invalid {name}: {what}")
    }
}

#[derive(Clone, Debug)]
struct ChoiceError {
    what: &'static str,
    actual: String,
    choices: &'static [&'static str],
}

impl core::fmt::Display for ChoiceError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "\"{}\" is not a valid {}. Choices include: {:?}",
            self.actual, self.what, self.choices
        )
    }
}

#[derive(Clone, Debug)]
struct MetricCoordsError {
    what: String,
}

impl core::fmt::Display for MetricCoordsError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "incompatible metric/coordinates: {}", self.what)
    }
}

#[derive(Clone, Debug)]
struct PatchCountError {
    npatch: Vec<usize>,
}

impl core::fmt::Display for PatchCountError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "catalogs have patch counts {:?}. All catalogs must use the same \
             number of patches (or be un-patched)",
            self.npatch
        )
    }
}

#[derive(Clone, Debug)]
struct InputShapeError {
    what: String,
}

impl core::fmt::Display for InputShapeError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid point-set input: {}", self.what)
    }
}

#[derive(Clone, Debug)]
struct IncompatibleError {
    what: String,
}

impl core::fmt::Display for IncompatibleError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "can't combine correlation results: {}", self.what)
    }
}

#[derive(Clone, Debug)]
struct CovarianceError {
    what: String,
}

impl core::fmt::Display for CovarianceError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "can't estimate covariance: {}", self.what)
    }
}

#[derive(Clone, Debug)]
struct CommError {
    what: String,
}

impl core::fmt::Display for CommError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "communication failure: {}", self.what)
    }
}

#[derive(Clone, Debug)]
struct SerializationError {
    what: String,
}

impl core::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "serialization problem: {}", self.what)
    }
}

#[derive(Clone)]
struct InternalError(&'static str);

impl core::fmt::Display for InternalError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::fmt::Debug for InternalError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        assert!(Error::bin_spec("separation", "bad").is_configuration());
        assert!(Error::patch_count(vec![3, 4]).is_configuration());
        assert!(!Error::incompatible("nbins differ").is_configuration());
        assert!(Error::incompatible("nbins differ").is_incompatible());
        assert!(Error::covariance("no patches").is_covariance());
    }

    #[test]
    fn messages() {
        let err = Error::choice("metric", "Manhattan", &["Euclidean", "Arc"]);
        assert_eq!(
            err.to_string(),
            "\"Manhattan\" is not a valid metric. Choices include: [\"Euclidean\", \"Arc\"]"
        );
        let err = Error::bin_spec("separation", "min_sep must be less than max_sep");
        assert_eq!(
            err.to_string(),
            "problem with separation binning: min_sep must be less than max_sep"
        );
    }
}
