//! tokio-multipart エラー型

use std::fmt;

/// tokio-multipart エラー
#[derive(Debug)]
pub enum Error {
    /// I/O エラー
    Io(std::io::Error),
    /// multipart デコードエラー
    Multipart(shiguredo_multipart::MultipartError),
}

impl Error {
    /// 利用者側へ転送するための複製
    ///
    /// `std::io::Error` は Clone できないため、種別とメッセージを引き継いで作り直す。
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Multipart(e) => Error::Multipart(e.clone()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Multipart(e) => write!(f, "multipart error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Multipart(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<shiguredo_multipart::MultipartError> for Error {
    fn from(e: shiguredo_multipart::MultipartError) -> Self {
        Error::Multipart(e)
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
