// std
use std::{sync::Arc, thread};
// crates.io
use time::{Duration, macros};
// self
use token_exchange::{
	auth::ClientId,
	clock::ManualClock,
	limiter::{Admission, RateLimiter, WindowPolicy},
	store::MemoryCounterStore,
};

fn build_limiter(clock: &ManualClock, policy: WindowPolicy) -> RateLimiter {
	RateLimiter::new(Arc::new(MemoryCounterStore::default()), Arc::new(clock.clone()), policy)
}

fn clock() -> ManualClock {
	ManualClock::new(macros::datetime!(2025-11-10 12:00 UTC))
}

fn client(raw: &str) -> ClientId {
	ClientId::new(raw).expect("Client fixture should be valid.")
}

#[test]
fn quota_is_enforced_per_client() {
	let clock = clock();
	let limiter = build_limiter(&clock, WindowPolicy::default());
	let alice = client("192.0.2.1");
	let bob = client("192.0.2.2");

	for _ in 0..WindowPolicy::DEFAULT_QUOTA {
		assert!(limiter.admit(&alice).is_admitted());
	}

	clock.advance(Duration::seconds(20));

	let Admission::Rejected(directive) = limiter.admit(&alice) else {
		panic!("The request past the quota must be rejected.");
	};

	assert_eq!(directive.retry_after_secs(), 40);
	assert!((1..=60).contains(&directive.retry_after_secs()));
	assert!(limiter.admit(&bob).is_admitted(), "Other clients keep their own quota.");
	assert_eq!(limiter.len(), 2);
}

#[test]
fn window_resets_after_it_elapses() {
	let clock = clock();
	let limiter = build_limiter(&clock, WindowPolicy::new(Duration::seconds(60), 2));
	let alice = client("192.0.2.1");

	limiter.admit(&alice);
	limiter.admit(&alice);

	assert!(!limiter.admit(&alice).is_admitted());

	clock.advance(Duration::seconds(60));

	assert!(!limiter.admit(&alice).is_admitted(), "The reset instant still belongs to the window.");

	clock.advance(Duration::seconds(1));

	assert!(limiter.admit(&alice).is_admitted());
	assert!(limiter.admit(&alice).is_admitted());
	assert!(!limiter.admit(&alice).is_admitted());
}

#[test]
fn fixed_window_allows_a_burst_across_the_boundary() {
	let clock = clock();
	let limiter = build_limiter(&clock, WindowPolicy::new(Duration::seconds(60), 3));
	let alice = client("192.0.2.1");

	limiter.admit(&alice);
	clock.advance(Duration::seconds(59));

	assert!(limiter.admit(&alice).is_admitted());
	assert!(limiter.admit(&alice).is_admitted());

	clock.advance(Duration::seconds(2));

	for _ in 0..3 {
		assert!(limiter.admit(&alice).is_admitted());
	}
}

#[test]
fn concurrent_admissions_never_exceed_quota() {
	const THREADS: usize = 16;
	const PER_THREAD: usize = 8;

	let clock = clock();
	let limiter = build_limiter(&clock, WindowPolicy::default());
	let alice = client("192.0.2.1");
	let admitted = thread::scope(|scope| {
		let workers = (0..THREADS)
			.map(|_| {
				scope.spawn(|| {
					(0..PER_THREAD).filter(|_| limiter.admit(&alice).is_admitted()).count()
				})
			})
			.collect::<Vec<_>>();

		workers
			.into_iter()
			.map(|worker| worker.join().expect("Admission thread should not panic."))
			.sum::<usize>()
	});

	assert_eq!(admitted, WindowPolicy::DEFAULT_QUOTA as usize);
}

#[test]
fn sweep_drops_only_elapsed_windows() {
	let clock = clock();
	let limiter = build_limiter(&clock, WindowPolicy::default());

	limiter.admit(&client("192.0.2.1"));
	clock.advance(Duration::seconds(45));
	limiter.admit(&client("192.0.2.2"));
	clock.advance(Duration::seconds(30));

	assert_eq!(limiter.sweep(), 1);
	assert_eq!(limiter.len(), 1);
}
