use crate::engine::NativeFunction;
use crate::resolver::{classify, return_rule, ReturnRule, TypeDescriptor};
use crate::session::{FunctionId, ModuleId};
use kiln_ir::{IntermediateUnit, NativeType};
use rustc_hash::FxHashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: Option<String>,
    pub ty: NativeType,
    /// Type as written in the source (`jstring`, `unsigned int`).
    pub spelling: String,
    pub descriptor: TypeDescriptor,
}

/// A function discovered in a compiled module.
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    id: FunctionId,
    name: String,
    source_name: String,
    params: Vec<ParamDescriptor>,
    ret: NativeType,
    ret_spelling: String,
    return_rule: ReturnRule,
    native: Option<NativeFunction>,
}

impl FunctionHandle {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn module(&self) -> ModuleId {
        self.id.module
    }

    /// Decorated (linker) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as written in the source.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn return_type(&self) -> &NativeType {
        &self.ret
    }

    pub fn return_spelling(&self) -> &str {
        &self.ret_spelling
    }

    pub fn return_rule(&self) -> ReturnRule {
        self.return_rule
    }

    /// Entry address of the compiled code, zero when there is none.
    pub fn entry_address(&self) -> u64 {
        self.native.as_ref().map_or(0, |native| native.entry)
    }

    pub(crate) fn native(&self) -> Option<&NativeFunction> {
        self.native.as_ref()
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction '{}' <{:#x}>", self.name, self.entry_address())
    }
}

/// Builds the handles of `unit`'s functions, matching each to its compiled
/// code in `natives` by decorated name.
pub(crate) fn build(module: ModuleId, unit: &IntermediateUnit, natives: Vec<NativeFunction>) -> Vec<FunctionHandle> {
    let mut by_name: FxHashMap<String, NativeFunction> =
        natives.into_iter().map(|native| (native.name.clone(), native)).collect();
    unit.functions
        .iter()
        .enumerate()
        .map(|(index, def)| FunctionHandle {
            id: FunctionId { module, index },
            name: def.name.clone(),
            source_name: def.source_name.clone(),
            params: def
                .params
                .iter()
                .map(|param| ParamDescriptor {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    spelling: param.spelling.clone(),
                    descriptor: classify(&param.ty),
                })
                .collect(),
            ret: def.ret.clone(),
            ret_spelling: def.ret_spelling.clone(),
            return_rule: return_rule(&def.ret),
            native: by_name.remove(&def.name),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::{FunctionDef, IntKind, OpaqueTag, Param};

    fn def(name: &str, params: Vec<(NativeType, &str)>, ret: NativeType) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            source_name: name.trim_start_matches("_Z").to_string(),
            params: params
                .into_iter()
                .map(|(ty, spelling)| Param {
                    name: None,
                    ty,
                    spelling: spelling.to_string(),
                })
                .collect(),
            ret_spelling: ret.to_string(),
            ret,
            locals: Vec::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn descriptors_are_precomputed() {
        let unit = IntermediateUnit {
            file_name: "code.cpp".to_string(),
            functions: vec![
                def(
                    "greet",
                    vec![
                        (NativeType::opaque("JNIEnv_"), "JNIEnv *"),
                        (NativeType::opaque("_jstring"), "jstring"),
                    ],
                    NativeType::opaque("_jstring"),
                ),
                def("count", vec![(NativeType::Int(IntKind::Short), "short")], NativeType::Int(IntKind::Int)),
            ],
            opt_level: None,
        };
        let module = ModuleId { index: 0, generation: 1 };
        let natives = vec![NativeFunction {
            index: 1,
            name: "count".to_string(),
            entry: 0x1000,
        }];
        let handles = build(module, &unit, natives);

        assert_eq!(handles.len(), 2);
        let greet = &handles[0];
        assert_eq!(greet.arity(), 2);
        assert_eq!(greet.params()[0].descriptor, TypeDescriptor::EnvironmentContext);
        assert_eq!(greet.params()[1].descriptor, TypeDescriptor::ManagedString);
        assert_eq!(greet.return_rule(), ReturnRule::PassThrough(OpaqueTag::ManagedString));
        assert_eq!(greet.entry_address(), 0);
        assert_eq!(greet.to_string(), "NativeFunction 'greet' <0x0>");

        let count = &handles[1];
        assert_eq!(count.id(), FunctionId { module, index: 1 });
        assert_eq!(count.params()[0].descriptor, TypeDescriptor::Integer { bits: 16, signed: true });
        assert_eq!(count.entry_address(), 0x1000);
        assert_eq!(count.to_string(), "NativeFunction 'count' <0x1000>");
    }
}
