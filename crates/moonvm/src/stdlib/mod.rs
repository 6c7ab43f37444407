// Standard library, loadable group by group.

use std::sync::Arc;

use crate::interp::VmState;

pub mod base;
pub mod coroutine;
pub mod math;
pub mod string;
pub mod table;

/// Selects which library groups get installed into a VM's globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibsLoader {
    pub base: bool,
    pub coroutine: bool,
    pub table: bool,
    pub string: bool,
    pub math: bool,
}

impl LibsLoader {
    pub fn all() -> LibsLoader {
        LibsLoader {
            base: true,
            coroutine: true,
            table: true,
            string: true,
            math: true,
        }
    }

    pub fn none() -> LibsLoader {
        LibsLoader {
            base: false,
            coroutine: false,
            table: false,
            string: false,
            math: false,
        }
    }
}

impl Default for LibsLoader {
    fn default() -> Self {
        LibsLoader::all()
    }
}

pub fn open_libs(vm: &Arc<VmState>, libs: &LibsLoader) {
    if libs.base {
        base::open(vm);
    }
    if libs.coroutine {
        coroutine::open(vm);
    }
    if libs.table {
        table::open(vm);
    }
    if libs.string {
        string::open(vm);
    }
    if libs.math {
        math::open(vm);
    }
}
