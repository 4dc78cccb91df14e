//! Calls compiled functions with managed arguments.
//!
//! Every argument is validated and converted before native code runs; the
//! first failure aborts the invocation with no side effects.

use crate::catalog::{FunctionHandle, ParamDescriptor};
use crate::environment::Environment;
use crate::resolver::{ReturnRule, TypeDescriptor};
use crate::runtime::{ManagedRuntime, ObjectRef};
use crate::session::{FunctionId, Session};
use crate::InvokeError;
use kiln_ir::{EnvironmentFrame, NativeValue, OpaqueTag, OpaqueValue};
use kiln_source::{ClassNames, KilnConfig};

/// Binds a managed runtime to the class-name conventions used to check its
/// references.
#[derive(Debug, Clone)]
pub struct Bridge<R> {
    runtime: R,
    names: ClassNames,
}

impl<R: ManagedRuntime> Bridge<R> {
    pub fn new(runtime: R, names: ClassNames) -> Self {
        Self { runtime, names }
    }

    pub fn from_config(runtime: R, config: &KilnConfig) -> Self {
        Self::new(runtime, config.classes.clone())
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.names
    }

    /// Calls `function` with one managed value per declared parameter.
    ///
    /// Environment parameters take a placeholder argument (any value) and
    /// receive the call's [`Environment`] instead. Returns `None` for
    /// `void` functions and for results with no managed form.
    pub fn invoke(
        &self,
        session: &Session,
        function: FunctionId,
        args: &[ObjectRef],
    ) -> Result<Option<ObjectRef>, InvokeError> {
        invoke_with(session, &self.runtime, &self.names, function, args)
    }
}

pub(crate) fn invoke_with(
    session: &Session,
    runtime: &dyn ManagedRuntime,
    names: &ClassNames,
    id: FunctionId,
    args: &[ObjectRef],
) -> Result<Option<ObjectRef>, InvokeError> {
    let module = session.module(id.module).map_err(|_| InvokeError::StaleHandle(id))?;
    let function = module.function(id.index).ok_or(InvokeError::StaleHandle(id))?;
    if args.len() != function.arity() {
        return Err(InvokeError::ArgumentCount {
            function: function.name().to_string(),
            expected: function.arity(),
            actual: args.len(),
        });
    }
    if function.return_rule() == ReturnRule::Unsupported {
        return Err(InvokeError::UnsupportedReturn {
            function: function.name().to_string(),
            ty: function.return_spelling().to_string(),
        });
    }

    let env = Environment::new(session, runtime, names);
    let frame = EnvironmentFrame::new(&env);
    let values = function
        .params()
        .iter()
        .zip(args)
        .enumerate()
        .map(|(position, (param, &value))| marshal(function, position, param, value, runtime, names, frame.as_address()))
        .collect::<Result<Vec<_>, _>>()?;

    // Arguments are checked the same way whether or not the module can run.
    let context = module.context()?;
    let native = function.native().ok_or_else(|| InvokeError::EngineUnavailable {
        module: id.module,
        reason: format!("'{}' has no compiled code", function.name()),
    })?;

    log::trace!("invoking {} with {:?}", function, values);
    // SAFETY: every value was checked against its parameter's descriptor, and
    // `frame` outlives the call.
    let result = unsafe { context.call(native, &values) }?;

    if let Some(message) = env.take_pending() {
        log::debug!("{} left a pending exception: {message}", function.name());
        return Err(InvokeError::PendingException(message));
    }
    Ok(convert_return(function.return_rule(), result, runtime))
}

fn marshal(
    function: &FunctionHandle,
    position: usize,
    param: &ParamDescriptor,
    value: ObjectRef,
    runtime: &dyn ManagedRuntime,
    names: &ClassNames,
    env_address: u64,
) -> Result<OpaqueValue, InvokeError> {
    let descriptor = param.descriptor;
    match descriptor {
        TypeDescriptor::Integer { bits, .. } => runtime
            .long_value(value)
            .map(|long| OpaqueValue::integer(bits, long))
            .ok_or_else(|| InvokeError::UnsupportedArgument {
                function: function.name().to_string(),
                position,
                message: format!("no integer coercion available for {value}"),
            }),
        TypeDescriptor::Boolean => runtime
            .long_value(value)
            .map(|long| OpaqueValue::integer(8, i64::from(long != 0)))
            .ok_or_else(|| InvokeError::UnsupportedArgument {
                function: function.name().to_string(),
                position,
                message: format!("no integer coercion available for {value}"),
            }),
        TypeDescriptor::EnvironmentContext => Ok(OpaqueValue::pointer(OpaqueTag::EnvironmentContext, env_address)),
        TypeDescriptor::ManagedObject => Ok(OpaqueValue::pointer(OpaqueTag::ManagedObject, value.address())),
        TypeDescriptor::ManagedString | TypeDescriptor::ManagedClass | TypeDescriptor::ManagedArray(_) => {
            let tag = descriptor.opaque_tag().unwrap_or(OpaqueTag::ManagedObject);
            if runtime.is_null(value) {
                return Ok(OpaqueValue::pointer(tag, 0));
            }
            let class_name = runtime.class_name(value);
            if !descriptor.accepts_class(&class_name, names) {
                return Err(InvokeError::TypeMismatch {
                    function: function.name().to_string(),
                    position,
                    expected: descriptor.expected_class(names).unwrap_or_else(|| descriptor.to_string()),
                    actual: class_name,
                });
            }
            Ok(OpaqueValue::pointer(tag, value.address()))
        }
        TypeDescriptor::Unsupported => Err(InvokeError::UnsupportedArgument {
            function: function.name().to_string(),
            position,
            message: format!("parameter type '{}' cannot be passed from managed code", param.spelling),
        }),
    }
}

fn convert_return(rule: ReturnRule, result: NativeValue, runtime: &dyn ManagedRuntime) -> Option<ObjectRef> {
    match rule {
        ReturnRule::BoxInteger { signed, .. } => result.as_i64(signed).map(|value| runtime.box_long(value)),
        ReturnRule::PassThrough(_) => Some(ObjectRef(result.as_address().unwrap_or(0))),
        ReturnRule::Void | ReturnRule::Drop | ReturnRule::Unsupported => None,
    }
}
