use crate::types::{IntKind, NativeType};

/// Version constant reported by `GetVersion`.
pub const ENVIRONMENT_VERSION: i32 = 0x0001_0008;

/// A function native code can call through its environment pointer.
///
/// Every builtin takes the environment as its first argument. Source code
/// may spell a call either `Name(env, ...)` or `env->Name(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    GetVersion,
    LongValue,
    BoxLong,
    CallLongCallback,
    GetArrayLength,
    ExceptionCheck,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::GetVersion,
        Builtin::LongValue,
        Builtin::BoxLong,
        Builtin::CallLongCallback,
        Builtin::GetArrayLength,
        Builtin::ExceptionCheck,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::GetVersion => "GetVersion",
            Builtin::LongValue => "LongValue",
            Builtin::BoxLong => "BoxLong",
            Builtin::CallLongCallback => "CallLongCallback",
            Builtin::GetArrayLength => "GetArrayLength",
            Builtin::ExceptionCheck => "ExceptionCheck",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Symbol the engine binds the builtin's host implementation under.
    pub fn symbol(self) -> &'static str {
        match self {
            Builtin::GetVersion => "kiln_env_get_version",
            Builtin::LongValue => "kiln_env_long_value",
            Builtin::BoxLong => "kiln_env_box_long",
            Builtin::CallLongCallback => "kiln_env_call_long_callback",
            Builtin::GetArrayLength => "kiln_env_get_array_length",
            Builtin::ExceptionCheck => "kiln_env_exception_check",
        }
    }

    /// Parameters after the leading environment pointer.
    pub fn params(self) -> Vec<NativeType> {
        let object = || NativeType::opaque("_jobject");
        let long = NativeType::Int(IntKind::Long);
        match self {
            Builtin::GetVersion | Builtin::ExceptionCheck => vec![],
            Builtin::LongValue | Builtin::GetArrayLength => vec![object()],
            Builtin::BoxLong => vec![long],
            Builtin::CallLongCallback => vec![object(), long],
        }
    }

    pub fn ret(self) -> NativeType {
        match self {
            Builtin::GetVersion | Builtin::GetArrayLength => NativeType::Int(IntKind::Int),
            Builtin::LongValue | Builtin::CallLongCallback => NativeType::Int(IntKind::Long),
            Builtin::BoxLong => NativeType::opaque("_jobject"),
            Builtin::ExceptionCheck => NativeType::Int(IntKind::UChar),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
            assert!(builtin.symbol().starts_with("kiln_env_"));
        }
        assert_eq!(Builtin::from_name("FindClass"), None);
    }

    #[test]
    fn callback_signature() {
        let params = Builtin::CallLongCallback.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].pointee_struct(), Some("_jobject"));
        assert_eq!(Builtin::CallLongCallback.ret(), NativeType::Int(IntKind::Long));
    }
}
