use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use common::{BrokerClient, Error, OrderRequest, OrderSide};
use engine::AlpacaClient;

/// Accept one connection, answer with `response`, and hand back the raw request.
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        sock.write_all(response.as_bytes()).await.unwrap();
        let _ = sock.shutdown().await;
        String::from_utf8_lossy(&buf).to_string()
    });

    (format!("http://{addr}"), handle)
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= end + 4 + body_len
}

fn http(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn missing_position_reads_as_zero() {
    let (url, server) = serve_once(http("404 Not Found", r#"{"message":"position does not exist"}"#)).await;
    let client = AlpacaClient::new("abc", "xyz", url).unwrap();

    assert_eq!(client.position_qty("AAPL").await.unwrap(), 0.0);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v2/positions/AAPL "), "{request}");
}

#[tokio::test]
async fn requests_carry_credentials() {
    let body = r#"{"symbol":"AAPL","qty":"7","avg_entry_price":"100.5","market_value":"720.0"}"#;
    let (url, server) = serve_once(http("200 OK", body)).await;
    let client = AlpacaClient::new("abc", "xyz", format!("{url}/")).unwrap();

    assert_eq!(client.position_qty("AAPL").await.unwrap(), 7.0);

    let request = server.await.unwrap().to_lowercase();
    assert!(request.contains("apca-api-key-id: abc"), "{request}");
    assert!(request.contains("apca-api-secret-key: xyz"), "{request}");
}

#[tokio::test]
async fn account_decimals_are_parsed() {
    let body = r#"{"cash":"1500.25","buying_power":"3000.5","equity":"2100","status":"ACTIVE"}"#;
    let (url, server) = serve_once(http("200 OK", body)).await;
    let client = AlpacaClient::new("abc", "xyz", url).unwrap();

    let account = client.account().await.unwrap();
    assert_eq!(account.cash, 1500.25);
    assert_eq!(account.buying_power, 3000.5);
    assert_eq!(account.equity, 2100.0);
    assert!(server.await.unwrap().starts_with("GET /v2/account "));
}

#[tokio::test]
async fn rejected_order_surfaces_status_and_body() {
    let (url, server) = serve_once(http("422 Unprocessable Entity", r#"{"message":"qty must be > 0"}"#)).await;
    let client = AlpacaClient::new("abc", "xyz", url).unwrap();

    let err = client
        .submit_order(&OrderRequest::market("AAPL", OrderSide::Buy, 1.0))
        .await
        .unwrap_err();
    match err {
        Error::Broker(msg) => {
            assert!(msg.contains("422"), "{msg}");
            assert!(msg.contains("qty must be > 0"), "{msg}");
        }
        other => panic!("expected broker error, got {other:?}"),
    }

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v2/orders "), "{request}");
    assert!(request.contains(r#""symbol":"AAPL""#), "{request}");
    assert!(request.contains(r#""type":"market""#), "{request}");
}

#[tokio::test]
async fn bars_come_from_the_data_host() {
    // Newest first, as requested with sort=desc
    let body = r#"{"bars":[
        {"t":"2024-03-01T15:00:00Z","o":10.5,"h":12.0,"l":10.0,"c":11.75,"v":900},
        {"t":"2024-03-01T14:00:00Z","o":10.0,"h":11.0,"l":9.5,"c":10.5,"v":1200}
    ],"symbol":"AAPL","next_page_token":null}"#;
    let (url, server) = serve_once(http("200 OK", body)).await;
    let client = AlpacaClient::new("abc", "xyz", "http://127.0.0.1:9").unwrap().with_data_url(url);

    let bars = client.bars("AAPL", "1Hour", 15).await.unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].close, 10.5);
    assert_eq!(bars[1].close, 11.75);
    assert!(bars[0].timestamp < bars[1].timestamp);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v2/stocks/AAPL/bars?"), "{request}");
    assert!(request.contains("timeframe=1Hour"), "{request}");
    assert!(request.contains("limit=15"), "{request}");
    assert!(request.contains("sort=desc"), "{request}");
    assert!(request.contains("start="), "{request}");
}

#[tokio::test]
async fn null_bars_mean_no_data() {
    let (url, server) = serve_once(http("200 OK", r#"{"bars":null,"symbol":"ZZZZ"}"#)).await;
    let client = AlpacaClient::new("abc", "xyz", url.clone()).unwrap().with_data_url(url);

    assert!(client.bars("ZZZZ", "1Day", 5).await.unwrap().is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_host_is_an_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AlpacaClient::new("abc", "xyz", format!("http://{addr}")).unwrap();
    let err = client.account().await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "{err:?}");
}

#[tokio::test]
async fn news_is_read_from_the_data_host() {
    let body = r#"{"news":[{"id":24843171,"headline":"Apple beats estimates","summary":"",
        "author":"Benzinga","source":"benzinga","url":"https://example.test/a",
        "symbols":["AAPL"],"created_at":"2024-03-01T15:00:00Z","updated_at":"2024-03-01T15:00:00Z"}],
        "next_page_token":null}"#;
    let (url, server) = serve_once(http("200 OK", body)).await;
    let client = AlpacaClient::new("abc", "xyz", "http://127.0.0.1:9").unwrap().with_data_url(url);

    let news = client.news(3).await.unwrap();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0].symbols, vec!["AAPL".to_string()]);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v1beta1/news?limit=3 "), "{request}");
}

#[tokio::test]
async fn positions_decode_string_decimals() {
    let body = r#"[
        {"symbol":"AAPL","qty":"12","avg_entry_price":"181.4","market_value":"2200.8","side":"long"},
        {"symbol":"MSFT","qty":"3.5","avg_entry_price":"402","market_value":null,"side":"long"}
    ]"#;
    let (url, server) = serve_once(http("200 OK", body)).await;
    let client = AlpacaClient::new("abc", "xyz", url).unwrap();

    let positions = client.positions().await.unwrap();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].symbol, "AAPL");
    assert_eq!(positions[0].qty, 12.0);
    assert_eq!(positions[0].avg_entry_price, 181.4);
    assert_eq!(positions[0].market_value, 2200.8);
    assert_eq!(positions[1].qty, 3.5);
    assert_eq!(positions[1].market_value, 0.0);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v2/positions "), "{request}");
}

#[tokio::test]
async fn open_orders_query_open_status() {
    let body = r#"[
        {"id":"o1","client_order_id":"c1","symbol":"AAPL","side":"buy","qty":"5",
         "status":"new","filled_avg_price":null,"submitted_at":"2024-03-01T15:04:05Z"},
        {"id":"o2","client_order_id":"c2","symbol":"MSFT","side":"sell","qty":null,
         "status":"partially_filled","filled_avg_price":"401.25","submitted_at":"2024-03-01T15:05:00Z"}
    ]"#;
    let (url, server) = serve_once(http("200 OK", body)).await;
    let client = AlpacaClient::new("abc", "xyz", url).unwrap();

    let orders = client.open_orders().await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].qty, 5.0);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].filled_avg_price, None);
    assert_eq!(orders[1].qty, 0.0);
    assert_eq!(orders[1].side, OrderSide::Sell);
    assert_eq!(orders[1].filled_avg_price, Some(401.25));
    assert_eq!(orders[1].status, "partially_filled");

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v2/orders?status=open "), "{request}");
}
