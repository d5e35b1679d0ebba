use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_postgres::Client;

/// 为连接池中的每个连接挂一个保活任务；间隔带随机抖动，失败只记录不退出
pub fn spawn_keepalive(client: Arc<Client>, min_secs: u64, max_secs: u64) {
    let max_secs = max_secs.max(min_secs + 1);
    tokio::spawn(async move {
        loop {
            let wait = rand::rng().random_range(min_secs..=max_secs);
            tokio::time::sleep(Duration::from_secs(wait)).await;
            if client.is_closed() {
                tracing::warn!("postgres connection closed; keepalive stopped");
                break;
            }
            match tokio::time::timeout(Duration::from_secs(5), client.execute("SELECT 1", &[]))
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!("postgres keepalive failed: {}", e),
                Err(_) => tracing::debug!("postgres keepalive timed out"),
            }
        }
    });
}
