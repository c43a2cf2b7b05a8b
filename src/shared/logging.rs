use tracing_subscriber::EnvFilter;

/// トレーシングの初期化。二重初期化は無視する。
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
