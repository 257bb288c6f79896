//! Infrastructure layer: broker client, task dispatcher, worker runtime,
//! retry loop, remote-service clients, and the delivery store.

pub mod authority;
pub mod availability;
pub mod broker;
pub mod dispatcher;
pub mod entrega_store;
pub mod retry;
pub mod worker;
pub mod workflow;

pub use authority::{AuthorityClient, AuthorityError, HttpAuthorityClient};
pub use availability::{AlwaysAvailable, DownstreamAvailability, NeverAvailable, SimulatedFlaky};
pub use broker::{Broker, BrokerError, InMemoryBroker, InspectState, RedisBroker, ResultEntry};
pub use dispatcher::TaskDispatcher;
pub use entrega_store::{EntregaStore, EntregaStoreError, InMemoryEntregaStore, PostgresEntregaStore};
pub use retry::{HttpRetrySubmitter, RetryError, RetryLoop, RetryOutcome, RetryPolicy, RetrySubmitter};
pub use worker::{TaskHandler, TaskOutcome, Worker};
pub use workflow::{ConfirmationOutcome, ConfirmationWorkflow, WorkflowError};
