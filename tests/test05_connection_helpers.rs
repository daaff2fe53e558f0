//! Connection URL helpers and the factory provider registry.

use std::sync::Arc;

use sql_reactive_bridge::prelude::*;
use sql_reactive_bridge::driver;
use sql_reactive_bridge::test_utils::{
    MockConnection, MockConnectionFactory, MockProvider, MockResultSpec,
};

#[test]
fn get_connection_resolves_a_registered_scheme() {
    let connection = MockConnection::new(vec![MockResultSpec::RowCount(1)]);
    let factory = MockConnectionFactory::new(Arc::clone(&connection));
    driver::register_provider("mockdb", Arc::new(MockProvider::new(Arc::clone(&factory))));

    let opened = get_connection("mockdb://localhost:5432/app").unwrap();
    assert_eq!(factory.connect_subscriptions(), 1);

    // It really is the scripted connection.
    drop(opened.create_statement("SELECT 1").unwrap());
    assert!(connection.statement_log().is_empty());
}

#[test]
fn get_connection_with_credentials_uses_the_same_registry() {
    let connection = MockConnection::new(Vec::new());
    let factory = MockConnectionFactory::new(connection);
    driver::register_provider(
        "mockcred",
        Arc::new(MockProvider::new(Arc::clone(&factory))),
    );

    let opened = get_connection_with_credentials("mockcred://localhost/app", "bob", "secret");
    assert!(opened.is_ok());
    assert_eq!(factory.connect_subscriptions(), 1);
}

#[test]
fn unknown_scheme_is_rejected() {
    let err = get_connection("unregistered://localhost/app").unwrap_err();
    assert!(matches!(err, SqlBridgeError::Configuration(_)));
}

#[test]
fn unparsable_url_is_rejected() {
    let err = get_connection("not a url at all").unwrap_err();
    assert!(matches!(err, SqlBridgeError::Configuration(_)));
}

#[test]
fn failing_connection_publisher_surfaces_as_data_access() {
    let factory = MockConnectionFactory::failing("refused");
    driver::register_provider("mockfail", Arc::new(MockProvider::new(factory)));

    let err = get_connection("mockfail://localhost/app").unwrap_err();
    assert!(matches!(err, SqlBridgeError::DataAccess(_)));
    assert!(err.to_string().contains("refused"));
}

#[test]
fn empty_connection_publisher_surfaces_as_data_access() {
    let factory = MockConnectionFactory::empty();
    driver::register_provider("mockempty", Arc::new(MockProvider::new(factory)));

    let err = get_connection("mockempty://localhost/app").unwrap_err();
    assert!(matches!(err, SqlBridgeError::DataAccess(_)));
    assert!(err.to_string().contains("without a connection"));
}
