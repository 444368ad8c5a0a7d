//! Completes a [`ResponseFuture`] from the events of a unary call.

use crate::call::Listener;
use crate::error::Error;
use crate::future::Completer;
use crate::metadata::Metadata;
use crate::status::Status;

/// Listener that records the single response of a unary call and resolves
/// the future when the call closes.
pub struct UnaryResponseListener<Resp> {
    completer: Completer<Resp>,
    value: Option<Resp>,
}

impl<Resp> UnaryResponseListener<Resp> {
    pub fn new(completer: Completer<Resp>) -> Self {
        Self {
            completer,
            value: None,
        }
    }
}

impl<Resp: Send> Listener<Resp> for UnaryResponseListener<Resp> {
    fn on_message(&mut self, message: Resp) -> Result<(), Error> {
        if self.value.is_some() {
            let err = Status::internal("More than one value received for unary call")
                .into_error(Metadata::new());
            self.completer.set_error(Error::Status(err.clone()));
            return Err(err.into());
        }
        self.value = Some(message);
        Ok(())
    }

    fn on_close(&mut self, status: Status, trailers: Metadata) {
        if !status.is_ok() {
            self.completer.set_error(status.into_error(trailers).into());
            return;
        }
        match self.value.take() {
            Some(value) => {
                self.completer.set(value);
            }
            None => {
                let err = Status::internal("No value received for unary call").into_error(trailers);
                self.completer.set_error(err.into());
            }
        }
    }
}
