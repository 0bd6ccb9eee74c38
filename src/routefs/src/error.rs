use thiserror::Error;

/// Errors produced by filesystem operations.
///
/// Every variant corresponds to one POSIX errno; [`Error::errno`] returns the
/// conventional negative value for callers that speak errno (the REPL, FUSE
/// adapters, and similar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// No such file or directory (ENOENT)
    #[error("no such file or directory")]
    NoEntry,

    /// File exists (EEXIST)
    #[error("file exists")]
    Exists,

    /// Not a directory (ENOTDIR)
    #[error("not a directory")]
    NotDir,

    /// Is a directory (EISDIR)
    #[error("is a directory")]
    IsDir,

    /// Permission denied (EACCES)
    #[error("permission denied")]
    Access,

    /// Operation not permitted (EPERM)
    #[error("operation not permitted")]
    Perm,

    /// Out of memory (ENOMEM)
    #[error("out of memory")]
    NoMemory,

    /// Directory not empty (ENOTEMPTY)
    #[error("directory not empty")]
    NotEmpty,

    /// File name too long (ENAMETOOLONG)
    #[error("file name too long")]
    NameTooLong,

    /// Invalid argument (EINVAL)
    #[error("invalid argument")]
    Invalid,

    /// Result too large for the given buffer (ERANGE)
    #[error("result out of range")]
    Range,

    /// No such extended attribute (ENODATA)
    #[error("no such attribute")]
    NoAttr,

    /// Bad file descriptor (EBADF)
    #[error("bad file descriptor")]
    BadFd,

    /// Input/output error; indicates an internal invariant violation (EIO)
    #[error("input/output error")]
    Io,

    /// Resource deadlock avoided; indicates a lock-handling bug (EDEADLK)
    #[error("resource deadlock avoided")]
    Deadlock,

    /// Resource temporarily unavailable, e.g. the deferred queue is not
    /// accepting work (EAGAIN)
    #[error("resource temporarily unavailable")]
    Again,
}

impl Error {
    /// The negative errno conventionally used for this error.
    pub fn errno(self) -> i32 {
        match self {
            Error::NoEntry => -libc::ENOENT,
            Error::Exists => -libc::EEXIST,
            Error::NotDir => -libc::ENOTDIR,
            Error::IsDir => -libc::EISDIR,
            Error::Access => -libc::EACCES,
            Error::Perm => -libc::EPERM,
            Error::NoMemory => -libc::ENOMEM,
            Error::NotEmpty => -libc::ENOTEMPTY,
            Error::NameTooLong => -libc::ENAMETOOLONG,
            Error::Invalid => -libc::EINVAL,
            Error::Range => -libc::ERANGE,
            Error::NoAttr => -libc::ENODATA,
            Error::BadFd => -libc::EBADF,
            Error::Io => -libc::EIO,
            Error::Deadlock => -libc::EDEADLK,
            Error::Again => -libc::EAGAIN,
        }
    }
}

/// Library-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
