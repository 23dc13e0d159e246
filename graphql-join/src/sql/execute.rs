//! Execution of compiled statements.
//!
//! Database drivers come in two shapes. A [`Driver`] returns the rows of a statement from an
//! awaited call. A [`CallbackDriver`] is handed the statement along with a [`Completion`] and
//! reports the outcome through it, possibly from another task and at some later time.
//!
//! Resolvers never talk to either kind of driver directly. They go through [`Execute`], which
//! [`Direct`] and [`Callback`] implement for the two kinds of driver. Both adapters deliver
//! exactly one outcome per statement: either all of the rows or a single error.

use super::db::{self, Row, Statement};
use crate::Error;
use async_std::sync::Arc;
use async_trait::async_trait;
use derive_more::From;
use futures::channel::oneshot;

/// A driver which returns the result of a statement from an awaited call.
#[async_trait]
pub trait Driver: Send + Sync {
    type Error: db::Error;

    /// Run `statement` and collect all of its rows.
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, Self::Error>;

    /// A short description of the database behind this driver.
    fn describe(&self) -> String;
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Arc<D> {
    type Error = D::Error;

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, Self::Error> {
        (**self).query(statement).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A driver which reports the result of a statement through a completion handle.
pub trait CallbackDriver: Send + Sync {
    type Error: db::Error;

    /// Start running `statement`.
    ///
    /// The driver must eventually call [`Completion::done`] on `done`. Dropping it without
    /// completing it fails the statement.
    fn query_with_callback(&self, statement: Statement, done: Completion<Self::Error>);

    /// A short description of the database behind this driver.
    fn describe(&self) -> String;
}

/// The handle through which a [`CallbackDriver`] reports the outcome of a statement.
///
/// Completing the handle consumes it, so a statement cannot complete twice.
#[derive(Debug)]
pub struct Completion<E> {
    sender: oneshot::Sender<Result<Vec<Row>, E>>,
}

impl<E> Completion<E> {
    fn new() -> (Self, oneshot::Receiver<Result<Vec<Row>, E>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Report the outcome of the statement.
    ///
    /// If the request which issued the statement has since been abandoned, this does nothing.
    pub fn done(self, result: Result<Vec<Row>, E>) {
        if self.sender.send(result).is_err() {
            tracing::warn!("statement completed after its request was abandoned");
        }
    }

    /// Report success.
    pub fn ok(self, rows: Vec<Row>) {
        self.done(Ok(rows))
    }

    /// Report failure.
    pub fn err(self, err: E) {
        self.done(Err(err))
    }

    /// Whether the request waiting on this completion has been abandoned.
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }
}

/// The uniform entry point for running compiled statements.
#[async_trait]
pub trait Execute: Send + Sync {
    /// Run `statement`, producing all of its rows or a single failure.
    async fn execute(&self, statement: Statement) -> Result<Vec<Row>, Error>;

    /// A short description of the database statements run against.
    fn describe(&self) -> String;
}

/// Execute statements with a [`Driver`].
#[derive(Clone, Debug, From)]
pub struct Direct<D>(D);

#[async_trait]
impl<D: Driver> Execute for Direct<D> {
    async fn execute(&self, statement: Statement) -> Result<Vec<Row>, Error> {
        self.0.query(&statement).await.map_err(Error::execution)
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

/// Execute statements with a [`CallbackDriver`].
#[derive(Clone, Debug, From)]
pub struct Callback<D>(D);

#[async_trait]
impl<D: CallbackDriver> Execute for Callback<D> {
    async fn execute(&self, statement: Statement) -> Result<Vec<Row>, Error> {
        let (done, outcome) = Completion::new();
        self.0.query_with_callback(statement, done);
        match outcome.await {
            Ok(result) => result.map_err(Error::execution),
            Err(oneshot::Canceled) => Err(Error::execution(
                "driver dropped the statement without completing it",
            )),
        }
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

/// A [`CallbackDriver`] which runs each statement on a [`Driver`] in a new task, completing the
/// handle when the query finishes.
#[derive(Debug)]
pub struct Spawn<D>(Arc<D>);

impl<D> Clone for Spawn<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D> From<Arc<D>> for Spawn<D> {
    fn from(driver: Arc<D>) -> Self {
        Self(driver)
    }
}

impl<D> Spawn<D> {
    pub fn new(driver: D) -> Self {
        Self(Arc::new(driver))
    }
}

impl<D: Driver + 'static> CallbackDriver for Spawn<D> {
    type Error = D::Error;

    fn query_with_callback(&self, statement: Statement, done: Completion<Self::Error>) {
        let driver = self.0.clone();
        async_std::task::spawn(async move {
            done.done(driver.query(&statement).await);
        });
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}
