mod support;

use dynamodb_kit::{Error, common, read, testing};
use rstest::rstest;
use serde::{Deserialize, Serialize};
use std::{collections, time::Duration};
use support::{Entry, client, transport};

fn partition_query(partition: &str, options: read::query::QueryOptions) -> read::query::Query {
    read::query::Query {
        condition: common::Expression::new("#pk = :pk")
            .name("#pk", "pk")
            .value(":pk", common::string_value(partition)),
        options,
    }
}

fn seeded(transport: &testing::MemoryTransport, partition: &str, count: i64) {
    for sort in 0..count {
        let item = serde_dynamo::to_item(Entry::new(partition, sort)).unwrap();
        transport.insert(support::TABLE, item).unwrap();
    }
}

#[rstest]
#[case::single_item_pages(1)]
#[case::small_pages(7)]
#[case::exact_page(25)]
#[case::large_page(100)]
#[tokio::test]
async fn test_query_completeness(#[case] page_size: usize) {
    let (client, transport) = client(transport().with_page_size(page_size));
    seeded(&transport, "b", 25);
    seeded(&transport, "c", 3);

    let page: read::query::QueryPage<Entry> = client
        .query(partition_query("b", Default::default()))
        .await
        .unwrap();
    assert_eq!(page.cursor, None);
    assert_eq!(page.items, (0..25).map(|sort| Entry::new("b", sort)).collect::<Vec<_>>());
    let unique = page
        .items
        .iter()
        .map(|entry| entry.sk)
        .collect::<collections::BTreeSet<_>>();
    assert_eq!(unique.len(), 25);
    assert_eq!(transport.calls(testing::Operation::Query), 25_usize.div_ceil(page_size).max(1));
}

#[rstest]
#[case::below_page(3, 10)]
#[case::equal_page(10, 10)]
#[case::above_page(15, 10)]
#[case::several_pages(23, 4)]
#[tokio::test]
async fn test_query_limit(#[case] limit: u32, #[case] page_size: usize) {
    let (client, transport) = client(transport().with_page_size(page_size));
    seeded(&transport, "b", 25);

    let options = read::query::QueryOptions {
        limit: Some(limit),
        ..Default::default()
    };
    let first: read::query::QueryPage<Entry> =
        client.query(partition_query("b", options)).await.unwrap();
    assert_eq!(first.items.len(), limit as usize);
    assert!(first.cursor.is_some());

    let options = read::query::QueryOptions {
        cursor: first.cursor,
        ..Default::default()
    };
    let rest: read::query::QueryPage<Entry> =
        client.query(partition_query("b", options)).await.unwrap();
    assert_eq!(rest.cursor, None);
    let all = first
        .items
        .into_iter()
        .chain(rest.items)
        .collect::<Vec<_>>();
    assert_eq!(all, (0..25).map(|sort| Entry::new("b", sort)).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_query_limit_and_resume() {
    let (client, transport) = client(transport());
    seeded(&transport, "users#1", 2);

    let options = read::query::QueryOptions {
        limit: Some(1),
        ..Default::default()
    };
    let first: read::query::QueryPage<Entry> =
        client.query(partition_query("users#1", options)).await.unwrap();
    assert_eq!(first.items, vec![Entry::new("users#1", 0)]);
    let cursor = first.cursor.unwrap();
    assert!(!cursor.is_empty());

    let options = read::query::QueryOptions {
        limit: Some(1),
        cursor: Some(cursor),
        ..Default::default()
    };
    let second: read::query::QueryPage<Entry> =
        client.query(partition_query("users#1", options)).await.unwrap();
    assert_eq!(second.items, vec![Entry::new("users#1", 1)]);
    assert_eq!(second.cursor, None);
}

#[tokio::test]
async fn test_query_follows_filtered_pages() {
    let (client, transport) = client(transport().with_page_size(3));
    seeded(&transport, "b", 10);

    let options = read::query::QueryOptions {
        filter: Some(
            common::Expression::new("#sk >= :from")
                .name("#sk", "sk")
                .value(":from", common::number_value(8)),
        ),
        ..Default::default()
    };
    let page: read::query::QueryPage<Entry> =
        client.query(partition_query("b", options)).await.unwrap();
    assert_eq!(page.items, vec![Entry::new("b", 8), Entry::new("b", 9)]);
    assert_eq!(transport.calls(testing::Operation::Query), 4);
}

#[derive(Debug, Deserialize, PartialEq)]
struct SortOnly {
    sk: i64,
}

#[tokio::test]
async fn test_query_descending_with_range() {
    let (client, transport) = client(transport());
    seeded(&transport, "b", 10);

    let query = read::query::Query {
        condition: common::Expression::new("#pk = :pk AND #sk BETWEEN :low AND :high")
            .name("#pk", "pk")
            .name("#sk", "sk")
            .value(":pk", common::string_value("b"))
            .value(":low", common::number_value(2))
            .value(":high", common::number_value(4)),
        options: read::query::QueryOptions {
            scan_index_forward: Some(false),
            selection: Some(common::selection::Selection::new(["sk"])),
            ..Default::default()
        },
    };
    let page: read::query::QueryPage<SortOnly> = client.query(query).await.unwrap();
    assert_eq!(
        page.items,
        vec![SortOnly { sk: 4 }, SortOnly { sk: 3 }, SortOnly { sk: 2 }]
    );
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct Labelled {
    pk: String,
    sk: i64,
    label: String,
}

#[tokio::test]
async fn test_query_index() {
    let transport = transport().with_index(
        support::TABLE,
        "by_label",
        common::key::KeySchema::new("pk", "label"),
    );
    let (client, transport) = client(transport);
    for (sort, label) in [(1, "c"), (2, "a"), (3, "b")] {
        let item = serde_dynamo::to_item(Labelled {
            pk: "b".to_string(),
            sk: sort,
            label: label.to_string(),
        })
        .unwrap();
        transport.insert(support::TABLE, item).unwrap();
    }
    let options = read::query::QueryOptions {
        index: Some("by_label".to_string()),
        ..Default::default()
    };
    let page: read::query::QueryPage<Labelled> =
        client.query(partition_query("b", options)).await.unwrap();
    assert_eq!(
        page.items.iter().map(|item| item.sk).collect::<Vec<_>>(),
        vec![2, 3, 1]
    );
}

#[tokio::test]
async fn test_query_page_and_string_cursor() {
    #[derive(Deserialize, Serialize)]
    struct PageKey {
        pk: String,
        sk: i64,
    }

    let (client, transport) = client(transport().with_page_size(2));
    seeded(&transport, "b", 5);

    let mut cursor = String::new();
    let mut seen = Vec::new();
    loop {
        let options = read::query::QueryOptions {
            cursor: read::cursor::decode::<PageKey>(&cursor).unwrap(),
            ..Default::default()
        };
        let page: read::query::QueryPage<Entry> = client
            .query_page(partition_query("b", options))
            .await
            .unwrap();
        seen.extend(page.items.into_iter().map(|entry| entry.sk));
        match read::cursor::encode::<PageKey>(page.cursor.as_ref()).unwrap() {
            Some(next) => cursor = next,
            None => break,
        }
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(transport.calls(testing::Operation::Query), 3);
}

#[rstest]
#[case::zero(0)]
#[case::too_large(u32::MAX)]
#[tokio::test]
async fn test_query_invalid_limit(#[case] limit: u32) {
    let (client, transport) = client(transport());
    let options = read::query::QueryOptions {
        limit: Some(limit),
        ..Default::default()
    };
    let actual = client
        .query::<Entry>(partition_query("b", options))
        .await
        .unwrap_err();
    assert!(matches!(actual, Error::InvalidLimit(value) if value == limit));
    assert_eq!(transport.calls(testing::Operation::Query), 0);
}

#[tokio::test(start_paused = true)]
async fn test_query_cancellation_stops_paging() {
    let (client, transport) = client(
        transport()
            .with_page_size(1)
            .with_latency(Duration::from_millis(10)),
    );
    seeded(&transport, "b", 50);

    let actual = tokio::time::timeout(
        Duration::from_millis(25),
        client.query::<Entry>(partition_query("b", Default::default())),
    )
    .await;
    assert!(actual.is_err());
    let calls = transport.calls(testing::Operation::Query);
    assert!(calls < 50);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.calls(testing::Operation::Query), calls);
}
