//! End-to-end scenarios against a mock service on a unix socket.

use std::cell::RefCell;
use std::rc::Rc;

use sesame_client::{ClientConfig, Dispatcher, SecretService, SecretValue};
use sesame_integration_tests::{init_tracing, item, schema};
use sesame_mock::MockService;

fn dispatcher(mock: &MockService) -> Dispatcher {
    Dispatcher::connect(mock.config()).unwrap()
}

/// Pre-seeded `{2, two, true} -> "222"`, removed first through the callback
/// form and then through the blocking form.
#[test]
fn test_remove_async_then_sync() {
    init_tracing();
    let mock = MockService::start("scenario-async-then-sync").unwrap();
    let dispatcher = dispatcher(&mock);
    let two = item(2, "two", true);

    let value = dispatcher.lookup_sync(&schema(), &two).unwrap();
    assert_eq!(value.as_ref().and_then(|v| v.as_text()), Some("222"));

    let removed = Rc::new(RefCell::new(None));
    let sink = removed.clone();
    dispatcher.remove_async(&schema(), &two, move |result| {
        *sink.borrow_mut() = Some(result.unwrap());
    });
    dispatcher.run_until_idle();
    assert_eq!(*removed.borrow(), Some(true));

    assert!(dispatcher.lookup_sync(&schema(), &two).unwrap().is_none());
    assert!(!dispatcher.remove_sync(&schema(), &two).unwrap());
}

/// The same scenario with the styles swapped.
#[test]
fn test_remove_sync_then_async() {
    init_tracing();
    let mock = MockService::start("scenario-sync-then-async").unwrap();
    let dispatcher = dispatcher(&mock);
    let two = item(2, "two", true);

    assert!(dispatcher.remove_sync(&schema(), &two).unwrap());
    assert!(dispatcher.lookup_sync(&schema(), &two).unwrap().is_none());

    let removed = Rc::new(RefCell::new(None));
    let sink = removed.clone();
    dispatcher.remove_async(&schema(), &two, move |result| {
        *sink.borrow_mut() = Some(result.unwrap());
    });
    dispatcher.run_until_idle();
    assert_eq!(*removed.borrow(), Some(false));
}

#[test]
fn test_store_replace_then_lookup() {
    init_tracing();
    let mock = MockService::start("scenario-store").unwrap();
    let dispatcher = dispatcher(&mock);
    let attributes = item(1, "one", false);

    dispatcher
        .store_sync(&schema(), &attributes, None, "One", &SecretValue::text("secret1"), true)
        .unwrap();
    let value = dispatcher.lookup_sync(&schema(), &attributes).unwrap();
    assert_eq!(value.as_ref().and_then(|v| v.as_text()), Some("secret1"));
}

#[test]
fn test_sync_and_async_send_identical_traffic() {
    init_tracing();
    let attributes = item(3, "three", false);

    let blocking = MockService::start("scenario-traffic-sync").unwrap();
    let d = dispatcher(&blocking);
    d.lookup_sync(&schema(), &attributes).unwrap();
    d.remove_sync(&schema(), &attributes).unwrap();

    let callbacks = MockService::start("scenario-traffic-async").unwrap();
    let d = dispatcher(&callbacks);
    let inner = d.clone();
    d.lookup_async(&schema(), &attributes, move |_| {
        inner.remove_async(&schema(), &item(3, "three", false), |_| {});
    });
    d.run_until_idle();

    let strip = |mock: &MockService| -> Vec<(String, serde_json::Value)> {
        mock.handle()
            .requests()
            .into_iter()
            .filter(|r| r.method == "SearchItems" || r.method == "DeleteItem")
            .map(|r| (r.method, r.params.unwrap_or_default()))
            .collect()
    };
    assert_eq!(blocking.handle().methods_called(), callbacks.handle().methods_called());
    assert_eq!(strip(&blocking), strip(&callbacks));
}

#[tokio::test]
async fn test_async_service_over_socket() {
    init_tracing();
    let mock = MockService::start("scenario-async-socket").unwrap();
    let service = SecretService::connect(mock.config()).await.unwrap();

    let value = service.lookup(&schema(), &item(1, "one", false)).await.unwrap();
    assert_eq!(value.as_ref().and_then(|v| v.as_text()), Some("111"));
    assert_eq!(service.resolve_alias("default").await.unwrap(), service.read_alias("default").await.unwrap());
    service.disconnect().await.unwrap();
}

#[test]
fn test_registered_mock_start_and_stop() {
    init_tracing();
    let (config, handle) = sesame_mock::start("scenario-registered").unwrap();
    let dispatcher = Dispatcher::connect(config).unwrap();

    assert!(dispatcher.remove_sync(&schema(), &item(1, "one", false)).unwrap());
    assert_eq!(handle.calls("DeleteItem"), 2);

    dispatcher.disconnect().unwrap();
    assert!(sesame_mock::stop("scenario-registered"));
}

#[test]
fn test_unreachable_service_is_transport_error() {
    init_tracing();
    let config = ClientConfig {
        address: Some("unix:path=/nonexistent/sesame/bus".to_string()),
        ..ClientConfig::default()
    };
    let err = Dispatcher::connect(config).unwrap_err();
    assert!(matches!(err, sesame_client::Error::Transport(_)), "{err:?}");
}
