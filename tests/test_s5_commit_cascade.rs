mod common;

use common::clear_thread_transaction;
use pooled_datasource::error::ResourceError;
use pooled_datasource::{BranchId, EndFlag, StartFlag, TransactionCoordinator, TxErrorKind, Vote, XaResource};
use std::sync::{Arc, Mutex};

struct LoggingResource {
    key: u64,
    fail_commit: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl XaResource for LoggingResource {
    fn resource_key(&self) -> u64 {
        self.key
    }

    fn start(&mut self, _branch: BranchId, _flag: StartFlag) -> Result<(), ResourceError> {
        self.log.lock().unwrap().push(format!("r{}:start", self.key));
        Ok(())
    }

    fn end(&mut self, _branch: BranchId, _flag: EndFlag) -> Result<(), ResourceError> {
        self.log.lock().unwrap().push(format!("r{}:end", self.key));
        Ok(())
    }

    fn commit(&mut self, _branch: BranchId, _one_phase: bool) -> Result<(), ResourceError> {
        if self.fail_commit {
            return Err("simulated commit failure".into());
        }
        self.log.lock().unwrap().push(format!("r{}:commit", self.key));
        Ok(())
    }

    fn rollback(&mut self, _branch: BranchId) -> Result<(), ResourceError> {
        self.log.lock().unwrap().push(format!("r{}:rollback", self.key));
        Ok(())
    }

    fn prepare(&mut self, _branch: BranchId) -> Result<Vote, ResourceError> {
        Ok(Vote::ReadOnly)
    }
}

#[test]
fn one_resource_failing_commit_rolls_back_the_whole_transaction() {
    clear_thread_transaction();
    let coordinator = TransactionCoordinator::global();
    let tx = coordinator.begin().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let r1 = LoggingResource {
        key: 1,
        fail_commit: false,
        log: log.clone(),
    };
    let r2 = LoggingResource {
        key: 2,
        fail_commit: true,
        log: log.clone(),
    };
    assert!(tx.enlist(Box::new(r1)).unwrap());
    assert!(tx.enlist(Box::new(r2)).unwrap());

    let err = coordinator.commit().unwrap_err();
    assert_eq!(err.kind(), TxErrorKind::System);

    let log = log.lock().unwrap();
    assert!(log.contains(&"r1:commit".to_string()), "r1 should have committed before r2 failed");
    assert!(log.contains(&"r1:end".to_string()));
    assert!(log.contains(&"r2:rollback".to_string()), "r2 should be rolled back after its commit failed");
    assert!(log.contains(&"r2:end".to_string()));
    assert!(!log.contains(&"r1:rollback".to_string()), "r1 already committed; it must not be rolled back too");
}
