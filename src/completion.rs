/// The terminal signal of a stream: it either finished normally or failed.
///
/// Exactly one completion may reach a subscriber, after which the
/// relationship between publisher and subscriber is over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion<E> {
  Finished,
  Failure(E),
}

impl<E> Completion<E> {
  #[inline]
  pub fn is_failure(&self) -> bool { matches!(self, Completion::Failure(_)) }

  /// Transforms the failure, leaving `Finished` untouched.
  pub fn map_failure<F, E2>(self, f: F) -> Completion<E2>
  where
    F: FnOnce(E) -> E2,
  {
    match self {
      Completion::Finished => Completion::Finished,
      Completion::Failure(err) => Completion::Failure(f(err)),
    }
  }

  /// Converts into a `Result`, `Ok(())` meaning the stream finished.
  pub fn into_result(self) -> Result<(), E> {
    match self {
      Completion::Finished => Ok(()),
      Completion::Failure(err) => Err(err),
    }
  }
}

impl<E> From<Result<(), E>> for Completion<E> {
  fn from(result: Result<(), E>) -> Self {
    match result {
      Ok(()) => Completion::Finished,
      Err(err) => Completion::Failure(err),
    }
  }
}
