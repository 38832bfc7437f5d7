//! Sole-owning kernel handle handed to the host.

use crate::kernel::Kernel;
use log::info;
use std::ops::{Deref, DerefMut};

/// Owning handle for one [`Kernel`].
///
/// # Invariants
/// - Exactly one handle owns a kernel; moving the handle moves ownership and
///   the source binding becomes unusable.
/// - Releasing (or dropping) the handle destroys the kernel.
pub struct KernelHandle {
    kernel: Box<Kernel>,
}

impl KernelHandle {
    pub(crate) fn new(kernel: Kernel) -> Self {
        Self {
            kernel: Box::new(kernel),
        }
    }

    /// Destroys the kernel owned by this handle.
    pub fn release(self) {
        info!(
            "event=kernel_release module=kernel status=ok session={} executions={}",
            self.kernel.session_id(),
            self.kernel.execution_count()
        );
    }

    pub fn into_inner(self) -> Box<Kernel> {
        self.kernel
    }
}

impl Deref for KernelHandle {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        &self.kernel
    }
}

impl DerefMut for KernelHandle {
    fn deref_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }
}
