use std::sync::Arc;

use apollo_stitching::Configuration;
use apollo_stitching::Context;
use apollo_stitching::ExternalObject;
use apollo_stitching::MergeTypes;
use apollo_stitching::MergedTypeConfig;
use apollo_stitching::RequestInfo;
use apollo_stitching::StitchedSchema;
use apollo_stitching::StitchingError;
use apollo_stitching::StitchingInfo;
use apollo_stitching::SubschemaConfig;
use apollo_stitching::graphql::Error;
use apollo_stitching::handle_object;
use apollo_stitching::json_ext::Path;
use apollo_stitching::selection::Operation;
use apollo_stitching::stitching_info::FieldOwnership;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use super::support::Gateway;
use super::support::InMemoryDelegator;
use super::support::by_sku;
use super::support::object;

const STITCHED_SDL: &str = r#"
  type Query { product(sku: String!): Product }
  type Product { sku: String! name: String price: Int }
  type Brand { id: ID! name: String }
"#;

const QUERY: &str = r#"{ product(sku: "k1") { sku price } }"#;

fn catalog() -> SubschemaConfig {
    SubschemaConfig::parse(
        "catalog",
        r#"
          type Query { product(sku: String!): Product brand: Brand }
          type Product { sku: String! name: String }
          type Brand { id: ID! name: String }
        "#,
    )
    .unwrap()
}

fn pricing() -> SubschemaConfig {
    SubschemaConfig::parse(
        "pricing",
        r#"
          type Query { productBySku(sku: String!): Product brand: Brand }
          type Product { sku: String! price: Int }
          type Brand { id: ID! }
        "#,
    )
    .unwrap()
}

fn merge_by_sku(field_name: &str) -> MergedTypeConfig {
    MergedTypeConfig::new()
        .selection_set("{ sku }")
        .field_name(field_name)
        .args(by_sku)
}

fn stitching_info(
    subschemas: Vec<SubschemaConfig>,
    merge_types: &MergeTypes,
) -> Result<StitchingInfo, StitchingError> {
    StitchingInfo::new(
        subschemas,
        merge_types,
        Arc::new(InMemoryDelegator::default()),
    )
}

#[test]
fn only_configured_types_are_merged() {
    let stitching_info = stitching_info(
        vec![
            catalog().merge("Product", merge_by_sku("product")),
            pricing().merge("Product", merge_by_sku("productBySku")),
        ],
        &MergeTypes::default(),
    )
    .unwrap();

    let merged: Vec<_> = stitching_info
        .merged_types()
        .map(|merged_type_info| merged_type_info.type_name().as_str())
        .collect();
    assert_eq!(merged, ["Product"]);

    let product = stitching_info.merged_type("Product").unwrap();
    let catalog = stitching_info.subschemas()[0].id();
    let pricing = stitching_info.subschemas()[1].id();
    assert_eq!(
        product.field_ownership("sku"),
        Some(&FieldOwnership::Shared(vec![catalog, pricing]))
    );
    assert_eq!(
        product.field_ownership("price"),
        Some(&FieldOwnership::Unique(pricing))
    );
    assert_eq!(product.target_subschemas(catalog), Some(&[pricing][..]));
    assert!(stitching_info.merged_type("Query").is_none());
}

#[test]
fn selected_types_still_need_a_merge_configuration() {
    let merge_types = Configuration::from_yaml("merge_types: true")
        .unwrap()
        .merge_types;
    let stitching_info = stitching_info(
        vec![
            catalog().merge("Product", merge_by_sku("product")),
            pricing().merge("Product", merge_by_sku("productBySku")),
        ],
        &merge_types,
    )
    .unwrap();

    assert!(stitching_info.merged_type("Product").is_some());
    assert!(stitching_info.merged_type("Brand").is_none());
}

#[test]
fn a_type_merged_by_one_subschema_has_no_targets() {
    let stitching_info = stitching_info(
        vec![catalog().merge("Product", merge_by_sku("product")), pricing()],
        &MergeTypes::default(),
    )
    .unwrap();

    let product = stitching_info.merged_type("Product").unwrap();
    assert_eq!(product.target_subschemas(stitching_info.subschemas()[0].id()), None);
    assert_eq!(product.field_ownership("price"), None);
}

#[test]
fn merge_configuration_needs_a_way_to_resolve() {
    let error = stitching_info(
        vec![
            catalog().merge("Product", merge_by_sku("product")),
            pricing().merge("Product", MergedTypeConfig::new().selection_set("{ sku }")),
        ],
        &MergeTypes::default(),
    )
    .unwrap_err();

    match error {
        StitchingError::MalformedMergeConfig {
            subschema,
            type_name,
            ..
        } => {
            assert_eq!(subschema, "pricing");
            assert_eq!(type_name, "Product");
        }
        other => panic!("unexpected error {other}"),
    }

    let error = stitching_info(
        vec![pricing().merge(
            "Product",
            MergedTypeConfig::new().field_name("productBySku"),
        )],
        &MergeTypes::default(),
    )
    .unwrap_err();
    assert!(matches!(error, StitchingError::MalformedMergeConfig { .. }));
}

#[test]
fn invalid_selection_text_is_rejected() {
    let error = stitching_info(
        vec![catalog().merge("Product", merge_by_sku("product").selection_set("{ sku"))],
        &MergeTypes::default(),
    )
    .unwrap_err();
    assert!(matches!(error, StitchingError::InvalidSelectionSet { .. }));

    let error = stitching_info(
        vec![catalog().merge(
            "Product",
            merge_by_sku("product").field("name", "{ sku"),
        )],
        &MergeTypes::default(),
    )
    .unwrap_err();
    assert!(matches!(error, StitchingError::InvalidSelectionSet { .. }));
}

#[test]
fn invalid_subschema_sdl_is_rejected() {
    let error = SubschemaConfig::parse("broken", "type Query { product: Missing }").unwrap_err();
    match error {
        StitchingError::InvalidSchema { name, .. } => assert_eq!(name, "broken"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn skipping_type_merging_keeps_the_object() {
    let delegator =
        InMemoryDelegator::default().serve("pricing", "sku", json!([{ "sku": "k1", "price": 12 }]));
    let gateway = Gateway::new(
        STITCHED_SDL,
        vec![
            catalog().merge("Product", merge_by_sku("product")),
            pricing().merge("Product", merge_by_sku("productBySku")),
        ],
        delegator,
    )
    .unwrap();
    let info = gateway.request(QUERY, "product", json!({}));
    let errors = [Error::builder()
        .message("partial")
        .path(Path::from("product/name"))
        .build()];

    let merged = handle_object(
        &info.return_type,
        ExternalObject::new(object(json!({ "sku": "k1" }))),
        &errors,
        gateway.subschema_id("catalog"),
        &Context::new(),
        &info,
        true,
    )
    .ready()
    .unwrap();

    assert_eq!(merged.data, object(json!({ "sku": "k1" })));
    assert_eq!(merged.subschema, Some(gateway.subschema_id("catalog")));
    assert_eq!(merged.errors[0].path, Some(Path::from("name")));
    assert!(gateway.delegator.calls().is_empty());
}

#[test]
fn schemas_without_stitching_info_are_not_merged() {
    let gateway = Gateway::new(
        STITCHED_SDL,
        vec![
            catalog().merge("Product", merge_by_sku("product")),
            pricing().merge("Product", merge_by_sku("productBySku")),
        ],
        InMemoryDelegator::default(),
    )
    .unwrap();
    let schema = Arc::new(StitchedSchema::parse(STITCHED_SDL).unwrap());
    assert!(schema.extensions.stitching_info.is_none());
    let operation = Operation::parse(QUERY).unwrap();
    let info = Arc::new(
        RequestInfo::for_root_field(schema, &operation, "product", object(json!({}))).unwrap(),
    );

    let merged = handle_object(
        &info.return_type,
        ExternalObject::new(object(json!({ "sku": "k1" }))),
        &[],
        gateway.subschema_id("catalog"),
        &Context::new(),
        &info,
        false,
    )
    .ready()
    .unwrap();

    assert_eq!(merged.data, object(json!({ "sku": "k1" })));
    assert!(gateway.delegator.calls().is_empty());
}

#[test]
fn unknown_root_fields_are_rejected() {
    let schema = Arc::new(StitchedSchema::parse(STITCHED_SDL).unwrap());
    let operation = Operation::parse(QUERY).unwrap();

    let error = RequestInfo::for_root_field(schema, &operation, "products", object(json!({})))
        .unwrap_err();
    assert!(matches!(error, StitchingError::InvalidOperation { .. }));
}
