//! Built-in host externals
//!
//! `print` (also reachable as `std.print`) formats register 0 to
//! standard output. Hosts embedding the VM register their own externals
//! through [`Cir::set_extern_fn`] the same way.

use crate::error::Result;
use crate::vm::Cir;

/// Install the standard externals into a machine.
pub fn register(vm: &mut Cir) {
    vm.set_extern_fn("print", print);
    vm.set_extern_fn("std.print", print);
}

fn print(vm: &mut Cir) -> Result<()> {
    println!("{}", vm.getr(0));
    Ok(())
}
