use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

/// Routes crate tracing through the test harness output. Safe to call from
/// every test; only the first call installs the subscriber.
#[allow(unused)]
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}

/// Returns a slot that records every value it receives, plus a closure that
/// drains the recording for assertions.
#[allow(unused)]
pub fn watcher<T: Send + Sync + 'static>()
-> (Box<dyn Fn(T) + Send + Sync>, Box<dyn Fn() -> Vec<T> + Send + Sync>) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let values = values.clone();
        Box::new(move |value: T| {
            values.lock().unwrap().push(value);
        })
    };

    let check = Box::new(move || {
        let drained: Vec<T> = values.lock().unwrap().drain(..).collect();
        drained
    });

    (record, check)
}
