//! HttpChainClient against a mocked gateway and JSON-RPC node

use rust_decimal::Decimal;
use serde_json::json;
use swap_bot::{
    amount::get_token_info,
    chain::{ChainClient, HttpChainClient, SignerHandle, TxStatus},
    config::ExecutionConfig,
    error::ChainError,
};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROUTER: &str = "0x10ED43C718714eb63d5aA57B78B54704E256024E";

fn client(server: &MockServer) -> HttpChainClient {
    let execution = ExecutionConfig {
        slippage_pct: Decimal::ONE,
        confirm_timeout_secs: 1,
        receipt_poll_ms: 100,
    };
    HttpChainClient::new(&server.uri(), &format!("{}/rpc", server.uri()), ROUTER, execution).unwrap()
}

#[tokio::test]
async fn test_get_price() {
    let server = MockServer::start().await;
    let wbnb = get_token_info("WBNB").unwrap();
    let usdt = get_token_info("USDT").unwrap();

    Mock::given(method("GET"))
        .and(path("/price"))
        .and(query_param("tokenIn", wbnb.address.as_str()))
        .and(query_param("tokenOut", usdt.address.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": "612.45"})))
        .mount(&server)
        .await;

    let price = assert_ok!(client(&server).get_price(&wbnb, &usdt).await);
    assert_eq!(price, "612.45".parse::<Decimal>().unwrap());
}

#[tokio::test]
async fn test_swap_sends_raw_amount() {
    let server = MockServer::start().await;
    let wbnb = get_token_info("WBNB").unwrap();
    let usdt = get_token_info("USDT").unwrap();

    Mock::given(method("POST"))
        .and(path("/swap"))
        .and(body_partial_json(json!({
            "from": "0xabc",
            "tokenIn": usdt.address.clone(),
            "amountIn": "10000000000000000000",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "txHash": "0xdeadbeef",
            "expectedOut": "16000000000000000",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let signer = SignerHandle::new("0xabc", "test");
    let submission = client(&server)
        .swap(&signer, &usdt, &wbnb, Decimal::from(10), Decimal::ONE)
        .await
        .unwrap();

    assert_eq!(submission.tx_ref, "0xdeadbeef");
    assert_eq!(submission.expected_out, Some("0.016".parse().unwrap()));
}

#[tokio::test]
async fn test_insufficient_funds_is_distinguished() {
    let server = MockServer::start().await;
    let wbnb = get_token_info("WBNB").unwrap();
    let usdt = get_token_info("USDT").unwrap();

    Mock::given(method("POST"))
        .and(path("/swap"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "INSUFFICIENT_BALANCE",
            "message": "USDT balance too low",
        })))
        .mount(&server)
        .await;

    let signer = SignerHandle::new("0xabc", "test");
    let err = client(&server)
        .swap(&signer, &usdt, &wbnb, Decimal::from(10), Decimal::ONE)
        .await
        .unwrap_err();
    assert!(err.is_insufficient_funds());
}

#[tokio::test]
async fn test_reverted_output_check_is_insufficient_funds() {
    let server = MockServer::start().await;
    let wbnb = get_token_info("WBNB").unwrap();
    let usdt = get_token_info("USDT").unwrap();

    Mock::given(method("POST"))
        .and(path("/swap"))
        .respond_with(ResponseTemplate::new(500).set_body_string(
            "execution reverted: PancakeRouter: INSUFFICIENT_OUTPUT_AMOUNT",
        ))
        .mount(&server)
        .await;

    let signer = SignerHandle::new("0xabc", "test");
    let err = client(&server)
        .swap(&signer, &usdt, &wbnb, Decimal::from(10), Decimal::ONE)
        .await
        .unwrap_err();
    assert!(err.is_insufficient_funds());
}

#[tokio::test]
async fn test_unrepresentable_amount_is_not_sent() {
    let server = MockServer::start().await;
    let wbnb = get_token_info("WBNB").unwrap();
    let usdt = get_token_info("USDT").unwrap();

    Mock::given(method("POST"))
        .and(path("/swap"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let signer = SignerHandle::new("0xabc", "test");
    let client = client(&server);

    let err = assert_err!(client.swap(&signer, &usdt, &wbnb, Decimal::from(-1), Decimal::ONE).await);
    assert!(matches!(err, ChainError::InvalidAmount(_)));

    // Below one base unit of an 18-decimal token
    let dust = Decimal::new(1, 20);
    let err = assert_err!(client.swap(&signer, &usdt, &wbnb, dust, Decimal::ONE).await);
    assert!(matches!(err, ChainError::InvalidAmount(_)));
    assert!(!err.is_insufficient_funds());
}

#[tokio::test]
async fn test_wait_for_confirmation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "status": "0x1",
                "blockNumber": "0x2a",
                "gasUsed": "0x186a0",
                "effectiveGasPrice": "0xb2d05e00",
            }
        })))
        .mount(&server)
        .await;

    let receipt = client(&server).wait_for_confirmation("0xdeadbeef").await.unwrap();
    assert_eq!(receipt.status, TxStatus::Success);
    assert_eq!(receipt.block_ref, Some(42));
    assert_eq!(receipt.fee_paid, "0.0003".parse::<Decimal>().unwrap());
}

#[tokio::test]
async fn test_confirmation_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": null,
        })))
        .mount(&server)
        .await;

    let err = assert_err!(client(&server).wait_for_confirmation("0xpending").await);
    assert!(matches!(err, ChainError::ConfirmationTimeout { .. }));
}

#[tokio::test]
async fn test_get_balance() {
    let server = MockServer::start().await;
    let usdt = get_token_info("USDT").unwrap();

    Mock::given(method("GET"))
        .and(path("/balance"))
        .and(query_param("owner", "0xabc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "balance": "1500000000000000000",
        })))
        .mount(&server)
        .await;

    let signer = SignerHandle::new("0xabc", "test");
    let balance = assert_ok!(client(&server).get_balance(&signer, &usdt).await);
    assert_eq!(balance, "1.5".parse::<Decimal>().unwrap());
}
