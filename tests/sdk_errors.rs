mod support;

use aws_sdk_dynamodb::config::{
    Credentials, Region,
    http::{HttpRequest, HttpResponse},
    retry::RetryConfig,
};
use aws_smithy_http_client::test_util::{ReplayEvent, StaticReplayClient};
use aws_smithy_runtime_api::http::StatusCode;
use aws_smithy_types::body::SdkBody;
use dynamodb_kit::{Client, Error};
use rstest::rstest;
use std::sync::Arc;
use support::{Entry, numbered_key, table};

const CONDITIONAL_CHECK_FAILED: &str = r#"{
    "__type": "com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException",
    "message": "The conditional request failed"
}"#;

const TRANSACTION_CONDITION_FAILED: &str = r#"{
    "__type": "com.amazonaws.dynamodb.v20120810#TransactionCanceledException",
    "Message": "Transaction cancelled, please refer cancellation reasons for specific reasons [None, ConditionalCheckFailed]",
    "CancellationReasons": [
        {"Code": "None"},
        {"Code": "ConditionalCheckFailed", "Message": "The conditional request failed"}
    ]
}"#;

const TRANSACTION_CONFLICT: &str = r#"{
    "__type": "com.amazonaws.dynamodb.v20120810#TransactionCanceledException",
    "Message": "Transaction cancelled, please refer cancellation reasons for specific reasons [TransactionConflict, None]",
    "CancellationReasons": [
        {"Code": "TransactionConflict", "Message": "Transaction is ongoing for the item"},
        {"Code": "None"}
    ]
}"#;

const VALIDATION: &str = r#"{
    "__type": "com.amazon.coral.validate#ValidationException",
    "message": "One or more parameter values were invalid"
}"#;

const INTERNAL: &str = r#"{
    "__type": "com.amazonaws.dynamodb.v20120810#InternalServerError",
    "message": "Internal server error"
}"#;

fn replay(status: u16, body: &'static str) -> (Client, StaticReplayClient) {
    let http_client = StaticReplayClient::new(vec![ReplayEvent::new(
        HttpRequest::new(SdkBody::empty()),
        HttpResponse::new(
            StatusCode::try_from(status).unwrap(),
            SdkBody::from(body),
        ),
    )]);
    let config = aws_sdk_dynamodb::Config::builder()
        .credentials_provider(Credentials::new("akid", "secret", None, None, "test"))
        .region(Region::new("us-east-1"))
        .http_client(http_client.clone())
        .retry_config(RetryConfig::disabled())
        .behavior_version_latest()
        .build();
    let sdk_client = aws_sdk_dynamodb::Client::from_conf(config);
    (Client::new(Arc::new(sdk_client), table()), http_client)
}

#[rstest]
#[case::conditional(400, CONDITIONAL_CHECK_FAILED, true)]
#[case::validation(400, VALIDATION, false)]
#[case::internal(500, INTERNAL, false)]
#[tokio::test]
async fn test_put_error_classification(
    #[case] status: u16,
    #[case] body: &'static str,
    #[case] conditional: bool,
) {
    let (client, http_client) = replay(status, body);
    let actual = client
        .put_item(numbered_key("s", 1), &Entry::new("s", 1), Default::default())
        .await
        .unwrap_err();
    assert_eq!(actual.is_conditional_check_failed(), conditional);
    assert_eq!(matches!(actual, Error::ConditionalCheckFailed), conditional);
    assert_eq!(matches!(actual, Error::Transport(_)), !conditional);
    assert!(!actual.is_validation_error());
    assert_eq!(http_client.actual_requests().count(), 1);
}

#[rstest]
#[case::condition(TRANSACTION_CONDITION_FAILED, &["None", "ConditionalCheckFailed"], true)]
#[case::conflict(TRANSACTION_CONFLICT, &["TransactionConflict", "None"], false)]
#[tokio::test]
async fn test_transaction_cancellation_reasons(
    #[case] body: &'static str,
    #[case] expected: &[&str],
    #[case] conditional: bool,
) {
    let (client, _) = replay(400, body);
    let actual = client
        .transact_delete_items(vec![numbered_key("s", 1), numbered_key("s", 2)])
        .await
        .unwrap_err();
    assert_eq!(actual.is_conditional_check_failed(), conditional);
    match actual {
        Error::TransactionCanceled { reasons } => assert_eq!(reasons, expected),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_transaction_other_error_is_transport() {
    let (client, _) = replay(500, INTERNAL);
    let actual = client
        .transact_delete_items(vec![numbered_key("s", 1)])
        .await
        .unwrap_err();
    assert!(matches!(actual, Error::Transport(_)));
    assert!(!actual.is_conditional_check_failed());
}

#[tokio::test]
async fn test_get_item_decodes_response() {
    let (client, _) = replay(
        200,
        r#"{"Item": {"pk": {"S": "s"}, "sk": {"N": "1"}, "label": {"S": "entry 1"}}}"#,
    );
    let actual: Option<Entry> = client
        .get_item(numbered_key("s", 1), Default::default())
        .await
        .unwrap();
    assert_eq!(actual, Some(Entry::new("s", 1)));
}
