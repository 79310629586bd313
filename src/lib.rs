//! # Tidepool
//!
//! A deterministic discrete-event simulation engine with cooperative
//! coroutine processes.
//!
//! The engine advances a virtual clock by popping the earliest entry from a
//! `(fire_time, sequence)`-ordered heap, resuming the associated process or
//! firing the associated event; processes schedule further work, which loops
//! back. On top of the scheduler sit completion events, timed delays,
//! all-of/any-of combinators, and two waiter-queue resources: a fungible
//! [`Container`] and a typed [`Store`]. A process's in-flight wait can be
//! cancelled with [`Process::interrupt`], which raises a recoverable fault
//! at the await site.
//!
//! Everything runs on one thread under one logical executor; identical
//! inputs dispatch identically across runs.
//!
//! ## Example
//!
//! ```rust
//! use tidepool::{Container, SimEnv, Value};
//!
//! let env = SimEnv::new();
//! let tank = Container::new(&env, 10);
//!
//! let producer = env.create_task({
//!     let env = env.clone();
//!     let tank = tank.clone();
//!     async move {
//!         env.delay(5).await?;
//!         tank.put(4)?.await?;
//!         Ok(())
//!     }
//! });
//! env.schedule_process(&producer, "producer")?;
//!
//! let consumer = env.create_task({
//!     let tank = tank.clone();
//!     async move {
//!         let got = tank.get(3)?.await?;
//!         assert_eq!(got, Value::Int(3));
//!         Ok(())
//!     }
//! });
//! env.schedule_process(&consumer, "consumer")?;
//!
//! env.run()?;
//! assert_eq!(env.now().ticks(), 5);
//! assert_eq!(tank.level(), 1);
//! # Ok::<(), tidepool::SimError>(())
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Event combinators: all-of and any-of composition.
pub mod combinators;
/// Fungible container resource.
pub mod container;
/// Core simulation environment and executor loop.
pub mod env;
/// Error types and utilities for simulation operations.
pub mod error;
/// Completion events, timed delays, and the suspension future.
pub mod event;
/// Scheduler entry heap.
mod events;
/// Process handles and interruption.
pub mod process;
/// Typed store resource.
pub mod store;
/// Virtual time for the simulation clock.
pub mod time;
/// Event payloads and the item capability trait.
pub mod value;

pub use combinators::{all_of, any_of};
pub use container::Container;
pub use env::{SimEnv, WeakSimEnv};
pub use error::{SimError, SimResult};
pub use event::{Event, EventWait};
pub use process::Process;
pub use store::{ItemFilter, Priority, Store};
pub use time::SimTime;
pub use value::{Item, Value};
