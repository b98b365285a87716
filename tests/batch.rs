mod support;

use aws_sdk_dynamodb::types::AttributeValue;
use dynamodb_kit::{Error, common, testing};
use rstest::rstest;
use support::{Entry, client, numbered_key, transport};

fn entries(partition: &str, count: i64) -> Vec<Entry> {
    (0..count).map(|sort| Entry::new(partition, sort)).collect()
}

#[tokio::test]
async fn test_batch_write_thousand_items() {
    let (client, transport) = client(transport());
    client.batch_write_items(&entries("b", 1000)).await.unwrap();
    assert_eq!(transport.calls(testing::Operation::BatchWriteItem), 40);
    assert_eq!(transport.items(support::TABLE).len(), 1000);

    let keys = (0..1000).map(|sort| numbered_key("b", sort)).collect();
    let mut actual: Vec<Entry> = client
        .batch_get_items(keys, Default::default())
        .await
        .unwrap();
    actual.sort_by_key(|entry| entry.sk);
    assert_eq!(actual, entries("b", 1000));
    assert_eq!(transport.calls(testing::Operation::BatchGetItem), 10);
}

#[tokio::test]
async fn test_batch_get_resubmits_unprocessed_keys() {
    let (client, transport) = client(transport().unprocessed_gets(3));
    client.batch_write_items(&entries("b", 150)).await.unwrap();

    let keys = (0..150)
        .map(|sort| numbered_key("b", sort))
        .chain([numbered_key("b", 999)])
        .collect();
    let actual: Vec<Entry> = client
        .batch_get_items(keys, Default::default())
        .await
        .unwrap();
    assert_eq!(actual.len(), 150);
    assert_eq!(transport.calls(testing::Operation::BatchGetItem), 5);
}

#[tokio::test]
async fn test_batch_write_rejects_items_without_keys() {
    let (client, transport) = client(transport());
    let items = vec![serde_json::json!({"pk": "b", "label": "no sort key"})];
    let actual = client.batch_write_items(&items).await.unwrap_err();
    assert!(matches!(actual, Error::MissingKey(field) if field == "sk"));
    assert_eq!(transport.calls(testing::Operation::BatchWriteItem), 0);
}

#[tokio::test]
async fn test_batch_write_aggregates_failures() {
    let (client, transport) = client(
        transport()
            .fail_batch_write_call(2)
            .with_unprocessed_writes(|request| {
                request
                    .put_request
                    .as_ref()
                    .is_some_and(|put| put.item["sk"] == common::number_value(60))
            }),
    );
    let actual = client.batch_write_items(&entries("b", 100)).await.unwrap_err();
    match actual {
        Error::BatchWrite { failed, errors } => {
            assert_eq!(failed.len(), 26);
            assert_eq!(errors.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.calls(testing::Operation::BatchWriteItem), 4);
    assert_eq!(transport.items(support::TABLE).len(), 74);
}

#[rstest]
#[case::only_existing(vec![0, 1, 2], vec![3, 4])]
#[case::with_missing(vec![1, 3, 40, 41], vec![0, 2, 4])]
#[case::only_missing(vec![100, 101], vec![0, 1, 2, 3, 4])]
#[tokio::test]
async fn test_batch_delete(#[case] deleted: Vec<i64>, #[case] remaining: Vec<i64>) {
    let (client, _) = client(transport());
    client.batch_write_items(&entries("b", 5)).await.unwrap();

    let keys = deleted.into_iter().map(|sort| numbered_key("b", sort)).collect();
    let failed = client.batch_delete_items(keys).await.unwrap();
    assert!(failed.is_empty());

    let mut actual: Vec<Entry> = client
        .batch_get_items(
            (0..5).map(|sort| numbered_key("b", sort)).collect(),
            Default::default(),
        )
        .await
        .unwrap();
    actual.sort_by_key(|entry| entry.sk);
    assert_eq!(
        actual.into_iter().map(|entry| entry.sk).collect::<Vec<_>>(),
        remaining
    );
}

fn sort_of(key: &common::key::Key) -> i64 {
    match &key.sort {
        AttributeValue::N(sort) => sort.parse().unwrap(),
        other => panic!("unexpected sort key: {other:?}"),
    }
}

#[tokio::test]
async fn test_batch_delete_returns_failed_keys() {
    let (client, transport) = client(
        transport()
            .fail_batch_write_call(2)
            .with_unprocessed_writes(|request| {
                request
                    .delete_request
                    .as_ref()
                    .is_some_and(|delete| delete.key["sk"] == common::number_value(7))
            }),
    );
    for entry in entries("b", 60) {
        transport
            .insert(support::TABLE, serde_dynamo::to_item(entry).unwrap())
            .unwrap();
    }

    let keys = (0..60).map(|sort| numbered_key("b", sort)).collect();
    let mut failed = client.batch_delete_items(keys).await.unwrap();
    failed.sort_by_key(sort_of);

    let expected = std::iter::once(7)
        .chain(25..50)
        .map(|sort| numbered_key("b", sort))
        .collect::<Vec<_>>();
    assert_eq!(failed, expected);
    assert_eq!(transport.calls(testing::Operation::BatchWriteItem), 3);
    assert_eq!(transport.items(support::TABLE).len(), 26);
}
