use crate::errors::{AppError, ErrorSeverity};
use std::future::Future;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

/// 非同期操作をスパンで包み、所要時間と結果を記録する
///
/// 失敗時のログレベルはエラーの重要度に従う。
pub async fn trace_operation<T, Fut>(operation_name: &'static str, operation: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    let span = tracing::info_span!("operation", name = operation_name);

    async move {
        let start_time = Instant::now();
        let result = operation.await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                info!(
                    operation = operation_name,
                    duration_ms, "Operation completed successfully"
                );
            }
            Err(e) => record_error(e, operation_name, duration_ms),
        }

        result
    }
    .instrument(span)
    .await
}

/// エラーを重要度に応じたレベルで記録
pub fn record_error(error: &AppError, context: &str, duration_ms: u64) {
    let metadata = error.metadata();

    if metadata.severity >= ErrorSeverity::Error {
        error!(
            error = %error,
            code = metadata.code,
            context = context,
            duration_ms,
            "Operation failed"
        );
    } else {
        warn!(
            error = %error,
            code = metadata.code,
            context = context,
            duration_ms,
            "Operation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trace_operation_passes_result_through() {
        let ok = trace_operation("test_ok", async { Ok::<_, AppError>(42) }).await;
        assert_eq!(ok, Ok(42));

        let err = trace_operation("test_err", async {
            Err::<i32, _>(AppError::Chain("reverted".to_string()))
        })
        .await;
        assert_eq!(err, Err(AppError::Chain("reverted".to_string())));
    }
}
