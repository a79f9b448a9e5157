use serde::{Deserialize, Serialize};

/// Outcome of a single execution or of a whole submission.
///
/// The ids form a total order by severity; aggregating a submission reduces
/// to taking the maximum id across its test results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum StatusId {
    Pending = 0,
    InQueue = 1,
    Processing = 2,
    Accepted = 3,
    WrongAnswer = 4,
    TimeLimitExceeded = 5,
    CompilationError = 6,
    RuntimeSigsegv = 7,
    RuntimeSigxfsz = 8,
    RuntimeSigfpe = 9,
    RuntimeSigabrt = 10,
    RuntimeNonZeroExit = 11,
    RuntimeError = 12,
    InternalError = 13,
    ExecFormatError = 14,
}

impl StatusId {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            StatusId::Pending => "Pending",
            StatusId::InQueue => "In Queue",
            StatusId::Processing => "Processing",
            StatusId::Accepted => "Accepted",
            StatusId::WrongAnswer => "Wrong Answer",
            StatusId::TimeLimitExceeded => "Time Limit Exceeded",
            StatusId::CompilationError => "Compilation Error",
            StatusId::RuntimeSigsegv => "Runtime Error (SIGSEGV)",
            StatusId::RuntimeSigxfsz => "Runtime Error (SIGXFSZ)",
            StatusId::RuntimeSigfpe => "Runtime Error (SIGFPE)",
            StatusId::RuntimeSigabrt => "Runtime Error (SIGABRT)",
            StatusId::RuntimeNonZeroExit => "Runtime Error (NZEC)",
            StatusId::RuntimeError => "Runtime Error",
            StatusId::InternalError => "Internal Error",
            StatusId::ExecFormatError => "Exec Format Error",
        }
    }

    pub fn status(self) -> Status {
        Status {
            id: self.id(),
            description: self.description().to_owned(),
        }
    }
}

/// Wire form of an outcome: the numeric id plus its human description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: u8,
    pub description: String,
}

impl Status {
    pub fn is(&self, id: StatusId) -> bool {
        self.id == id.id()
    }
}

impl From<StatusId> for Status {
    fn from(id: StatusId) -> Self {
        id.status()
    }
}
