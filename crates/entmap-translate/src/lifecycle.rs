//! Lifecycle callbacks.
//!
//! Callbacks are registered per class with [`crate::ClassBuilder`] and
//! dispatched by the class translator: save callbacks run before the fields
//! are translated, load callbacks run after every field has been set.
//! Callbacks declared by a class run before the ones it inherits.

use std::sync::Arc;

use tracing::trace;

use crate::context::{LoadContext, UnitOfWorkHandle};
use crate::error::{CallbackResult, TranslateError, TranslateResult};

type SaveCallback<E> = Arc<dyn Fn(&mut E, &dyn UnitOfWorkHandle) -> CallbackResult + Send + Sync>;
type LoadCallback<E> = Arc<dyn Fn(&mut E, &LoadContext<'_>) -> CallbackResult + Send + Sync>;

/// Which arguments a callback was declared to take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackArgs {
    None,
    UnitOfWork,
    LoadContext,
}

struct Callback<F> {
    args: CallbackArgs,
    invoke: F,
}

impl<F: Clone> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self {
            args: self.args,
            invoke: self.invoke.clone(),
        }
    }
}

/// Ordered save and load callbacks of one class.
pub struct Lifecycle<E> {
    on_save: Vec<Callback<SaveCallback<E>>>,
    on_load: Vec<Callback<LoadCallback<E>>>,
}

impl<E> Default for Lifecycle<E> {
    fn default() -> Self {
        Self {
            on_save: Vec::new(),
            on_load: Vec::new(),
        }
    }
}

impl<E> Clone for Lifecycle<E> {
    fn clone(&self) -> Self {
        Self {
            on_save: self.on_save.clone(),
            on_load: self.on_load.clone(),
        }
    }
}

impl<E: 'static> Lifecycle<E> {
    pub(crate) fn add_save(&mut self, f: fn(&mut E) -> CallbackResult) {
        self.on_save.push(Callback {
            args: CallbackArgs::None,
            invoke: Arc::new(move |e: &mut E, _unit: &dyn UnitOfWorkHandle| f(e)),
        });
    }

    pub(crate) fn add_save_with_unit(&mut self, f: fn(&mut E, &dyn UnitOfWorkHandle) -> CallbackResult) {
        self.on_save.push(Callback {
            args: CallbackArgs::UnitOfWork,
            invoke: Arc::new(f),
        });
    }

    pub(crate) fn add_load(&mut self, f: fn(&mut E) -> CallbackResult) {
        self.on_load.push(Callback {
            args: CallbackArgs::None,
            invoke: Arc::new(move |e: &mut E, _ctx: &LoadContext<'_>| f(e)),
        });
    }

    pub(crate) fn add_load_with_unit(&mut self, f: fn(&mut E, &dyn UnitOfWorkHandle) -> CallbackResult) {
        self.on_load.push(Callback {
            args: CallbackArgs::UnitOfWork,
            invoke: Arc::new(move |e: &mut E, ctx: &LoadContext<'_>| f(e, ctx.unit())),
        });
    }

    pub(crate) fn add_load_with_context(&mut self, f: fn(&mut E, &LoadContext<'_>) -> CallbackResult) {
        self.on_load.push(Callback {
            args: CallbackArgs::LoadContext,
            invoke: Arc::new(f),
        });
    }

    /// Append `other`'s callbacks after this lifecycle's own.
    pub(crate) fn extend(&mut self, other: Lifecycle<E>) {
        self.on_save.extend(other.on_save);
        self.on_load.extend(other.on_load);
    }

    pub fn has_save_callbacks(&self) -> bool {
        !self.on_save.is_empty()
    }

    pub fn has_load_callbacks(&self) -> bool {
        !self.on_load.is_empty()
    }

    /// Argument shapes of the save callbacks, in dispatch order.
    pub fn save_callback_args(&self) -> Vec<CallbackArgs> {
        self.on_save.iter().map(|c| c.args).collect()
    }

    pub fn load_callback_args(&self) -> Vec<CallbackArgs> {
        self.on_load.iter().map(|c| c.args).collect()
    }

    /// Run the save callbacks in order, stopping at the first failure.
    pub fn run_save(&self, entity: &mut E, unit: &dyn UnitOfWorkHandle) -> TranslateResult<()> {
        for callback in &self.on_save {
            trace!(args = ?callback.args, "on_save");
            (callback.invoke)(entity, unit).map_err(TranslateError::Callback)?;
        }
        Ok(())
    }

    pub fn run_load(&self, entity: &mut E, ctx: &LoadContext<'_>) -> TranslateResult<()> {
        for callback in &self.on_load {
            trace!(args = ?callback.args, "on_load");
            (callback.invoke)(entity, ctx).map_err(TranslateError::Callback)?;
        }
        Ok(())
    }

    /// Re-root the callbacks on a type that embeds `E` as its base.
    pub(crate) fn lift<D: 'static>(self, up_mut: fn(&mut D) -> &mut E) -> Lifecycle<D> {
        Lifecycle {
            on_save: self
                .on_save
                .into_iter()
                .map(|c| {
                    let inner = c.invoke;
                    Callback {
                        args: c.args,
                        invoke: Arc::new(move |d: &mut D, unit: &dyn UnitOfWorkHandle| {
                            inner(up_mut(d), unit)
                        }) as SaveCallback<D>,
                    }
                })
                .collect(),
            on_load: self
                .on_load
                .into_iter()
                .map(|c| {
                    let inner = c.invoke;
                    Callback {
                        args: c.args,
                        invoke: Arc::new(move |d: &mut D, ctx: &LoadContext<'_>| inner(up_mut(d), ctx))
                            as LoadCallback<D>,
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Detached;

    #[derive(Debug, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    #[derive(Default)]
    struct Log {
        events: Vec<&'static str>,
    }

    #[test]
    fn save_callbacks_run_in_order() {
        let mut lifecycle = Lifecycle::<Log>::default();
        lifecycle.add_save(|l| {
            l.events.push("first");
            Ok(())
        });
        lifecycle.add_save_with_unit(|l, unit| {
            assert!(unit.as_any().is::<Detached>());
            l.events.push("second");
            Ok(())
        });
        let mut log = Log::default();
        lifecycle.run_save(&mut log, &Detached).unwrap();
        assert_eq!(log.events, ["first", "second"]);
        assert_eq!(
            lifecycle.save_callback_args(),
            [CallbackArgs::None, CallbackArgs::UnitOfWork]
        );
    }

    #[test]
    fn failure_stops_dispatch_and_is_downcastable() {
        let mut lifecycle = Lifecycle::<Log>::default();
        lifecycle.add_load(|_| Err(Box::new(Refused)));
        lifecycle.add_load(|l| {
            l.events.push("unreachable");
            Ok(())
        });
        let mut log = Log::default();
        let err = lifecycle
            .run_load(&mut log, &LoadContext::detached())
            .unwrap_err();
        assert!(err.callback_error::<Refused>().is_some());
        assert_eq!(err.to_string(), "refused");
        assert!(log.events.is_empty());
    }

    #[test]
    fn lifted_callbacks_act_on_the_base() {
        #[derive(Default)]
        struct Outer {
            log: Log,
        }
        let mut base = Lifecycle::<Log>::default();
        base.add_load_with_context(|l, ctx| {
            assert_eq!(ctx.resolved_count(), 0);
            l.events.push("base");
            Ok(())
        });
        let lifted = base.lift::<Outer>(|o| &mut o.log);
        let mut outer = Outer::default();
        lifted.run_load(&mut outer, &LoadContext::detached()).unwrap();
        assert_eq!(outer.log.events, ["base"]);
        assert_eq!(lifted.load_callback_args(), [CallbackArgs::LoadContext]);
    }
}
