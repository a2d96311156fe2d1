//! Built-in response container adapters.
//!
//! | Declared type | Adapted type | Produces |
//! |---|---|---|
//! | `Either<E, S>`, `E` an exception | `S` | `Right(value)`, or `Left(error)` for failures of class `E` |
//! | `Either<E, S>`, `E` not throwable | `S` | `Left(decoded failure body)` or `Right(value)` |
//! | `Effect<E, S>` | `S` | a suspended [`Effect`](crate::value::Effect) |
//! | `Option<T>` | `T` | `None` for absent bodies |
//! | `Eval<T>` | `T` | a lazy [`Eval`](crate::value::Eval) |
//! | `NonEmptyList<T>` | `Collection<T>` | a [`NonEmptyList`](crate::value::NonEmptyList) |
//! | `Sequence<T>` / `Flow<T>` | `Stream<T>` | lazy element sequences |
//! | `Deferred<T>` | `T` | a running [`Deferred`](crate::value::Deferred) task |
//! | `Job` | nothing | a running [`Job`](crate::value::Job) |
//! | `Collection<T>`, `List<T>`, `Set<T>` | `List<T>` | the normalized element list |
//! | `Stream<T>` | `Collection<T>` | a single-pass element stream |

mod collection;
mod effect;
mod either;
mod eval;
mod non_empty;
mod object;
mod option;
mod recoverable;
mod sequence;
mod task;

pub use collection::{CollectionAdapter, StreamAdapter};
pub use effect::EffectAdapter;
pub use either::EitherAdapter;
pub use eval::EvalAdapter;
pub use non_empty::NonEmptyListAdapter;
pub use object::ObjectStage;
pub use option::OptionAdapter;
pub use recoverable::RecoverableEitherAdapter;
pub use sequence::{FlowAdapter, SequenceAdapter};
pub use task::{DeferredAdapter, JobAdapter};
