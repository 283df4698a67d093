use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub const MOCK_ADDR: &str = "127.0.0.1:3002";

#[allow(unused)]
pub fn url(path: &str) -> String {
    format!("http://{MOCK_ADDR}{path}")
}

#[allow(unused)]
pub async fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("surge=debug,healthz_probe=debug,mock_service=info")
            .init();

        // Each test runs on its own runtime, so the service gets a dedicated thread.
        std::thread::spawn(|| {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let addr: SocketAddr = MOCK_ADDR.parse().unwrap();
                if let Err(err) = mock_service::run(addr).await {
                    error!("Mock service failed: {err}");
                }
            });
        });
    });

    for _ in 0..100 {
        if tokio::net::TcpStream::connect(MOCK_ADDR).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock service did not come up on {MOCK_ADDR}");
}
