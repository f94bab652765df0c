//! Host numeric type objects: `SByte`, `Byte`, `Int16`, ... `Decimal`.
//! Calling one builds a primitive wrapper of that kind.

use crate::error::ScriptError;
use crate::runtime::callback::{CallbackArguments, ExecutionContext};
use crate::runtime::value::DynValue;
use crate::types::numeric::NumericKind;
use crate::types::wrapper;
use crate::Script;
use super::{constant, Export, Module};

pub struct PrimitivesModule;

impl Module for PrimitivesModule {
    fn name(&self) -> &'static str { "primitives" }

    fn exports(&self) -> Vec<Export> {
        NumericKind::ALL.iter().map(|k| constant(k.name())).collect()
    }

    fn call(
        &self,
        _name: &str,
        _ctx: &ExecutionContext,
        _args: &CallbackArguments,
    ) -> Result<Option<DynValue>, ScriptError> {
        Ok(None)
    }

    fn constant(&self, _script: &Script, name: &str) -> Option<DynValue> {
        NumericKind::from_name(name).map(wrapper::type_object)
    }
}
