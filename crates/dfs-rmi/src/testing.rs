//! A small interface used to exercise stubs and skeletons in tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dfs_proto::{CallEnvelope, CallOutcome, MethodDescriptor, RmiError};
use serde::{Deserialize, Serialize};

use crate::interface::{invoke, unknown_method, Dispatch, Interface};
use crate::stub::Stub;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithError {
    DivideByZero,
    Rmi(RmiError),
}

impl From<RmiError> for ArithError {
    fn from(e: RmiError) -> Self {
        ArithError::Rmi(e)
    }
}

#[async_trait]
pub trait Arith: Send + Sync {
    async fn add(&self, a: i64, b: i64) -> Result<i64, ArithError>;
    async fn divide(&self, a: i64, b: i64) -> Result<i64, ArithError>;
    async fn explode(&self) -> Result<(), ArithError>;
}

pub enum ArithRemote {}

impl Interface for ArithRemote {
    const NAME: &'static str = "Arith";
    const METHODS: &'static [MethodDescriptor] = &[
        MethodDescriptor::new("add", &["i64", "i64"], "i64"),
        MethodDescriptor::new("divide", &["i64", "i64"], "i64"),
        MethodDescriptor::new("explode", &[], "()"),
    ];
}

#[async_trait]
impl<S: Arith + ?Sized> Dispatch<S> for ArithRemote {
    async fn dispatch(
        server: &S,
        method: &'static MethodDescriptor,
        envelope: &CallEnvelope,
    ) -> CallOutcome {
        match method.name {
            "add" => invoke(envelope, |(a, b): (i64, i64)| server.add(a, b)).await,
            "divide" => invoke(envelope, |(a, b): (i64, i64)| server.divide(a, b)).await,
            "explode" => invoke(envelope, |(): ()| server.explode()).await,
            _ => unknown_method::<Self>(method),
        }
    }
}

#[async_trait]
impl Arith for Stub<ArithRemote> {
    async fn add(&self, a: i64, b: i64) -> Result<i64, ArithError> {
        self.call("add", (a, b)).await
    }

    async fn divide(&self, a: i64, b: i64) -> Result<i64, ArithError> {
        self.call("divide", (a, b)).await
    }

    async fn explode(&self) -> Result<(), ArithError> {
        self.call("explode", ()).await
    }
}

/// Second identity, to check that stubs of different interfaces differ.
pub enum EchoRemote {}

impl Interface for EchoRemote {
    const NAME: &'static str = "Echo";
    const METHODS: &'static [MethodDescriptor] =
        &[MethodDescriptor::new("echo", &["String"], "String")];
}

#[derive(Default)]
pub struct Calculator {
    calls: AtomicUsize,
}

impl Calculator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Arith for Calculator {
    async fn add(&self, a: i64, b: i64) -> Result<i64, ArithError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(a + b)
    }

    async fn divide(&self, a: i64, b: i64) -> Result<i64, ArithError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if b == 0 {
            return Err(ArithError::DivideByZero);
        }
        Ok(a / b)
    }

    async fn explode(&self) -> Result<(), ArithError> {
        panic!("explode called");
    }
}
