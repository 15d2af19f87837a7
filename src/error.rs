pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;

    /// Like [`ResultOkLogExt::ok_log`], but logs at trace level with the name of
    /// the value that failed. Used for per-metric reads, where a failure only
    /// means the metric is unsupported on this system.
    fn ok_trace(self, what: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_trace(self, what: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::trace!("{what} failed: {err}");
                None
            }
        }
    }
}
