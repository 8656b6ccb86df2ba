use apollo_stitching::ExternalObject;
use apollo_stitching::MergedTypeConfig;
use apollo_stitching::SubschemaConfig;
use apollo_stitching::json_ext::Object;
use apollo_stitching::json_ext::Value;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use super::support::Gateway;
use super::support::InMemoryDelegator;
use super::support::object;

const STITCHED_SDL: &str = r#"
  type Query { product(sku: String!): Product }
  type Product {
    sku: String!
    name: String
    price: Int
    shippingEstimate: Int
  }
"#;

fn sku(object: &ExternalObject) -> Value {
    object.data.get("sku").cloned().unwrap_or_default()
}

fn gateway() -> Gateway {
    let subschemas = vec![
        SubschemaConfig::parse(
            "catalog",
            "type Query { product(sku: String!): Product } type Product { sku: String! name: String }",
        )
        .unwrap()
        .merge(
            "Product",
            MergedTypeConfig::new()
                .selection_set("{ sku }")
                .field_name("products")
                .key(sku),
        ),
        SubschemaConfig::parse(
            "pricing",
            "type Query { prices(skus: [String!]!): [Product] } type Product { sku: String! price: Int }",
        )
        .unwrap()
        .merge(
            "Product",
            MergedTypeConfig::new()
                .selection_set("{ sku }")
                .field_name("prices")
                .key(sku)
                .args_from_keys(|keys| {
                    let mut arguments = Object::new();
                    arguments.insert("skus", Value::Array(keys.to_vec()));
                    arguments
                }),
        ),
        SubschemaConfig::parse(
            "shipping",
            "type Query { shipments(ids: [String!]!): [Product] } type Product { sku: String! shippingEstimate: Int }",
        )
        .unwrap()
        .merge(
            "Product",
            MergedTypeConfig::new()
                .selection_set("{ sku }")
                .field("shippingEstimate", "{ price }")
                .field_name("shipments")
                // Only answers once the price is known.
                .key(|object| {
                    object
                        .data
                        .get("sku")
                        .filter(|_| object.data.contains_key("price"))
                        .cloned()
                        .unwrap_or_default()
                }),
        ),
    ];
    let delegator = InMemoryDelegator::default()
        .serve("pricing", "sku", json!([{ "sku": "k1", "price": 12 }]))
        .serve(
            "shipping",
            "sku",
            json!([{ "sku": "k1", "shippingEstimate": 3 }]),
        );
    Gateway::new(STITCHED_SDL, subschemas, delegator).unwrap()
}

#[test]
fn keys_are_sent_with_batched_arguments() {
    let gateway = gateway();
    let info = gateway.request(r#"{ product(sku: "k1") { sku price } }"#, "product", json!({}));

    let merged = gateway
        .handle(&info, "catalog", json!({ "sku": "k1" }), &[])
        .ready()
        .unwrap();

    assert_eq!(merged.data, object(json!({ "sku": "k1", "price": 12 })));
    let calls = gateway.delegator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].subschema, "pricing");
    assert_eq!(calls[0].field_name, "prices");
    assert_eq!(calls[0].batch_key, Some(json!("k1")));
    assert_eq!(calls[0].arguments, json!({ "skus": ["k1"] }));
    assert!(calls[0].skip_type_merging);
}

#[test]
fn field_requirements_wait_for_an_earlier_pass() {
    let gateway = gateway();
    let info = gateway.request(
        r#"{ product(sku: "k1") { sku price shippingEstimate } }"#,
        "product",
        json!({}),
    );

    let merged = gateway
        .handle(&info, "catalog", json!({ "sku": "k1" }), &[])
        .ready()
        .unwrap();

    assert_eq!(
        merged.data,
        object(json!({ "sku": "k1", "price": 12, "shippingEstimate": 3 }))
    );
    assert!(merged.errors.is_empty());
    let calls = gateway.delegator.calls();
    let passes: Vec<_> = calls
        .iter()
        .map(|call| (call.subschema.as_str(), call.selection_set.as_str()))
        .collect();
    assert_eq!(
        passes,
        [("pricing", "{ price }"), ("shipping", "{ shippingEstimate }")]
    );
    assert_eq!(calls[1].arguments, json!({ "ids": ["k1"] }));
}

#[test]
fn requirements_are_fetched_when_not_requested() {
    let gateway = gateway();
    let info = gateway.request(
        r#"{ product(sku: "k1") { sku shippingEstimate } }"#,
        "product",
        json!({}),
    );

    let merged = gateway
        .handle(&info, "catalog", json!({ "sku": "k1" }), &[])
        .ready()
        .unwrap();

    assert_eq!(
        merged.data,
        object(json!({ "sku": "k1", "price": 12, "shippingEstimate": 3 }))
    );
    assert!(merged.errors.is_empty());
    let passes: Vec<_> = gateway
        .delegator
        .calls()
        .into_iter()
        .map(|call| (call.subschema, call.selection_set))
        .collect();
    assert_eq!(
        passes,
        [
            ("pricing".to_owned(), "{ price }".to_owned()),
            ("shipping".to_owned(), "{ shippingEstimate }".to_owned())
        ]
    );

    let stitching_info = gateway.schema.extensions.stitching_info.as_ref().unwrap();
    assert_eq!(
        stitching_info
            .selection_set_by_field("Product", "shippingEstimate")
            .map(ToString::to_string),
        Some("{ __typename sku price }".to_owned())
    );
}

#[tokio::test]
async fn pending_batches_run_pass_after_pass() {
    let gateway = gateway();
    gateway.delegator.answer_later();
    let info = gateway.request(
        r#"{ product(sku: "k1") { price shippingEstimate } }"#,
        "product",
        json!({}),
    );

    let merged = gateway
        .handle(&info, "catalog", json!({ "sku": "k1" }), &[])
        .await;

    assert_eq!(
        merged.data,
        object(json!({ "sku": "k1", "price": 12, "shippingEstimate": 3 }))
    );
    assert_eq!(gateway.delegator.calls().len(), 2);
}
