/// Call envelope and method descriptors for the RPC protocol.
///
/// A connection carries exactly one [`CallEnvelope`] from the caller and one
/// [`CallOutcome`] back. The envelope fields are serialized in declaration
/// order: method name, parameter descriptors, return descriptor, arguments.
/// Arguments travel as one bincode-encoded tuple; the remote side decodes
/// them with the types named by the resolved method.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RmiError;

/// Static description of one method of a remote interface.
///
/// Descriptors are what the skeleton matches against: a call resolves only
/// if both the name and the ordered parameter descriptors are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub returns: &'static str,
}

impl MethodDescriptor {
    pub const fn new(
        name: &'static str,
        params: &'static [&'static str],
        returns: &'static str,
    ) -> Self {
        Self {
            name,
            params,
            returns,
        }
    }

    /// Exact match on name and parameter descriptors.
    pub fn matches(&self, name: &str, params: &[String]) -> bool {
        self.name == name
            && self.params.len() == params.len()
            && self.params.iter().zip(params).all(|(a, b)| *a == b)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) -> {}", self.name, self.params.join(", "), self.returns)
    }
}

/// One RPC invocation as it travels from stub to skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub method: String,
    pub param_types: Vec<String>,
    pub return_type: String,
    pub args: Vec<u8>,
}

impl CallEnvelope {
    /// Build an envelope for `method`, encoding `args` as a tuple.
    pub fn new<A: Serialize>(method: &MethodDescriptor, args: &A) -> Result<Self, RmiError> {
        Ok(Self {
            method: method.name.to_owned(),
            param_types: method.params.iter().map(|p| (*p).to_owned()).collect(),
            return_type: method.returns.to_owned(),
            args: bincode::serialize(args)?,
        })
    }

    /// Decode the argument tuple.
    pub fn decode_args<A: DeserializeOwned>(&self) -> Result<A, RmiError> {
        Ok(bincode::deserialize(&self.args)?)
    }
}

/// Result of one RPC invocation as it travels back to the stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutcome {
    /// The method returned normally; payload is the encoded return value.
    Value(Vec<u8>),
    /// The method returned an error of the interface's declared error type;
    /// payload is that error, encoded.
    Exception(Vec<u8>),
    /// The RPC layer could not complete the call.
    Failure(RmiError),
}

impl CallOutcome {
    pub fn value<R: Serialize>(value: &R) -> Self {
        match bincode::serialize(value) {
            Ok(bytes) => Self::Value(bytes),
            Err(e) => Self::Failure(e.into()),
        }
    }

    pub fn exception<E: Serialize>(error: &E) -> Self {
        match bincode::serialize(error) {
            Ok(bytes) => Self::Exception(bytes),
            Err(e) => Self::Failure(e.into()),
        }
    }

    /// Turn the outcome back into the caller's result type.
    ///
    /// RPC-layer failures, and payloads that do not decode, are converted
    /// into the caller's error type through `From<RmiError>`.
    pub fn into_result<R, E>(self) -> Result<R, E>
    where
        R: DeserializeOwned,
        E: DeserializeOwned + From<RmiError>,
    {
        match self {
            Self::Value(bytes) => {
                bincode::deserialize(&bytes).map_err(|e| E::from(RmiError::from(e)))
            }
            Self::Exception(bytes) => match bincode::deserialize::<E>(&bytes) {
                Ok(err) => Err(err),
                Err(e) => Err(E::from(RmiError::from(e))),
            },
            Self::Failure(e) => Err(E::from(e)),
        }
    }
}
