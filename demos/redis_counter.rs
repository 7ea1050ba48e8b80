use outbound_breaker::{
    DispatchError, Dispatcher, DistributedBreaker, RedisStore, ReqwestTransport, Request,
};
use std::env;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let target = env::var("TARGET_URL").unwrap_or_else(|_| "http://127.0.0.1:8080/".to_string());

    let breaker = DistributedBreaker::builder(RedisStore::open(&redis_url)?)
        .failure_limit(3)
        .counter_ttl(Duration::from_secs(10))
        .build()?;

    let dispatcher = Dispatcher::builder(ReqwestTransport::new(Duration::from_secs(2))?)
        .distributed_breaker(breaker)
        .build();

    // Every process using this key shares one failure window.
    let request = Request::get(&target).breaker_key("demo-upstream").build();

    for attempt in 1..=6 {
        match dispatcher.execute(&request) {
            Ok(response) => println!("attempt {}: status {}", attempt, response.status()),
            Err(DispatchError::CircuitOpen) => println!("attempt {}: refused", attempt),
            Err(err) => println!("attempt {}: {}", attempt, err),
        }
    }

    if let Some(breaker) = dispatcher.distributed_breaker() {
        println!("failures in window: {}", breaker.failures("demo-upstream")?);
    }
    Ok(())
}
