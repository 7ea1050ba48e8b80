use outbound_breaker::{
    DispatchError, Dispatcher, HalfOpenMode, HookRegistry, LocalBreaker, Request, Response,
    Transport, TransportError, TripPolicy,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

// Simulated dependency: fails for a while, then recovers.
struct FlakyUpstream {
    calls: AtomicU32,
}

impl Transport for FlakyUpstream {
    fn send(&self, _request: &Request) -> Result<Response, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match call {
            1..=2 => Ok(Response::with_status(503)),
            3 => Err(TransportError::Timeout(Duration::from_millis(250))),
            _ => Ok(Response::with_status(200)),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let hooks = HookRegistry::new();
    hooks.set_on_transition(|transition| {
        println!("transition: {} -> {}", transition.from, transition.to);
    });

    let breaker = LocalBreaker::builder()
        .name("inventory")
        .policy(TripPolicy::ConsecutiveFailures)
        .failure_threshold(3)
        .reset_timeout(Duration::from_secs(1))
        .half_open_probe_quota(2)
        .half_open_mode(HalfOpenMode::Scheduled)
        .hooks(hooks)
        .build()
        .expect("valid breaker settings");

    let dispatcher = Dispatcher::builder(FlakyUpstream {
        calls: AtomicU32::new(0),
    })
    .local_breaker(breaker)
    .build();

    let request = Request::get("http://inventory.internal/items").build();

    for attempt in 1..=10 {
        match dispatcher.execute(&request) {
            Ok(response) => println!("attempt {}: status {}", attempt, response.status()),
            Err(DispatchError::CircuitOpen) => {
                println!("attempt {}: circuit open, backing off", attempt);
                thread::sleep(Duration::from_millis(600));
            }
            Err(err) => println!("attempt {}: {}", attempt, err),
        }

        if let Some(breaker) = dispatcher.local_breaker() {
            println!("  state: {}", breaker.state());
        }
    }
}
