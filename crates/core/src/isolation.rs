//! 隔离表面注册表
//!
//! 记录哪些请求进程属于嵌入式访客（guest）表面。

use dashmap::DashSet;

use crate::errors::CollaboratorResult;
use crate::types::ProcessId;

/// 隔离注册表接口
pub trait IsolationRegistry: Send + Sync {
    fn is_isolated_surface(&self, process_id: ProcessId) -> CollaboratorResult<bool>;
}

/// 访客进程注册表
#[derive(Debug, Default)]
pub struct GuestProcessRegistry {
    guests: DashSet<ProcessId>,
}

impl GuestProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记访客进程
    pub fn register_guest(&self, process_id: ProcessId) {
        if self.guests.insert(process_id) {
            tracing::debug!("[GuestRegistry] 登记访客进程 {}", process_id);
        }
    }

    /// 注销访客进程，返回之前是否已登记
    pub fn unregister_guest(&self, process_id: ProcessId) -> bool {
        self.guests.remove(&process_id).is_some()
    }

    pub fn is_guest(&self, process_id: ProcessId) -> bool {
        self.guests.contains(&process_id)
    }
}

impl IsolationRegistry for GuestProcessRegistry {
    fn is_isolated_surface(&self, process_id: ProcessId) -> CollaboratorResult<bool> {
        Ok(self.is_guest(process_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister_guest() {
        let registry = GuestProcessRegistry::new();
        assert!(!registry.is_isolated_surface(ProcessId(7)).unwrap());

        registry.register_guest(ProcessId(7));
        assert!(registry.is_isolated_surface(ProcessId(7)).unwrap());
        assert!(!registry.is_isolated_surface(ProcessId(8)).unwrap());

        assert!(registry.unregister_guest(ProcessId(7)));
        assert!(!registry.unregister_guest(ProcessId(7)));
        assert!(!registry.is_guest(ProcessId(7)));
    }
}
