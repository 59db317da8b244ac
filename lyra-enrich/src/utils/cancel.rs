//! Cooperative cancellation for remote calls

use lyra_common::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race `fut` against `token`; cancellation wins ties and yields [`Error::Cancelled`]
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
