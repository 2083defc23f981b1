//! Startup path from an env file to a client handle. Kept to a single test
//! because it writes the shared `API_*` process variables.

use std::io::Write;

use common::{BrokerClient, Config, ConfigLoader, TradingMode};
use engine::{connect, AlpacaFactory};
use paper::PaperFactory;

#[test]
fn env_file_to_client_handle() {
    for name in ["API_KEY", "API_SECRET", "API_BASE_URL", "TRADING_MODE", "STRICT_CREDENTIALS"] {
        std::env::remove_var(name);
    }

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "API_KEY=abc\nAPI_SECRET=xyz\nAPI_BASE_URL=https://example.test\n").unwrap();

    let loader = ConfigLoader::with_path(file.path());
    let cfg = Config::load(&loader).unwrap();

    assert_eq!(loader.get("API_KEY").as_deref(), Some("abc"));
    assert_eq!(loader.get("API_SECRET").as_deref(), Some("xyz"));
    assert_eq!(loader.get("API_BASE_URL").as_deref(), Some("https://example.test"));
    assert_eq!(cfg.trading_mode, TradingMode::Paper);

    // Loading again changes nothing
    let again = Config::load(&loader).unwrap();
    assert_eq!(again.broker, cfg.broker);

    let stub = PaperFactory::new(cfg.paper_cash, cfg.paper_slippage_bps);
    let handle = connect(&stub, &cfg.broker).unwrap();
    assert_eq!(handle.base_url(), "https://example.test");
    assert_eq!(stub.calls().len(), 1);
    assert_eq!(stub.calls()[0].api_key, "abc");
    assert_eq!(stub.calls()[0].api_secret, "xyz");

    let live = connect(&AlpacaFactory::with_data_url(&cfg.broker.data_url), &cfg.broker).unwrap();
    assert_eq!(live.base_url(), "https://example.test");
}
