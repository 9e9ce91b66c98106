//! User service: validation, transaction scoping, change tracking, notification

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::api::state::UserServiceTrait;
use crate::domain::user::{
    validate_user, ChangeSet, Page, UserEntity, UserEvent, UserId, UserNotification,
    UserNotifier, UserRecord, CREATE_FIELDS, UPDATE_FIELDS,
};
use crate::domain::{Cancellation, DomainError, ResultExt};
use crate::infrastructure::storage::{Transactioner, TxRunner};

use super::notifier::LoggingNotifier;
use super::store::UserStore;

/// Entry point for every user operation
pub struct UserService<T: Transactioner, S: UserStore> {
    transactioner: Arc<T>,
    store: Arc<S>,
    notifier: Arc<dyn UserNotifier>,
}

impl<T: Transactioner, S: UserStore> fmt::Debug for UserService<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserService").finish_non_exhaustive()
    }
}

impl<T: Transactioner, S: UserStore> UserService<T, S> {
    /// Create a service that notifies through [`LoggingNotifier`]
    pub fn new(transactioner: Arc<T>, store: Arc<S>) -> Self {
        Self {
            transactioner,
            store,
            notifier: Arc::new(LoggingNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn UserNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    async fn notify(&self, event: UserEvent, id: UserId, changes: Option<ChangeSet>) {
        self.notifier
            .notify(UserNotification { event, id, changes })
            .await;
    }
}

/// Begin a transaction bounded by the signal's deadline.
///
/// The server aborts statements still running at the deadline, so a statement
/// blocked on a lock cannot hold the transaction open past it.
async fn begin(
    transactioner: &dyn Transactioner,
    cancel: &Cancellation,
) -> Result<Box<dyn TxRunner>, DomainError> {
    let mut tx = cancel.run(transactioner.begin()).await?;

    if let Some(remaining) = cancel.remaining() {
        if let Err(err) = tx.set_statement_timeout(remaining).await {
            tx.abort();
            return Err(err);
        }
    }

    Ok(tx)
}

/// End a transaction according to the outcome of the work done inside it.
///
/// Commits only if the work succeeded and the signal has not fired. After a
/// cancellation the transaction is abandoned without waiting on the server;
/// any other failure is rolled back. A failed rollback is logged and the
/// original failure is returned.
async fn finish<R>(
    cancel: &Cancellation,
    tx: Box<dyn TxRunner>,
    outcome: Result<R, DomainError>,
) -> Result<R, DomainError> {
    let outcome = outcome.and_then(|value| {
        if cancel.is_cancelled() {
            Err(DomainError::Cancelled)
        } else {
            Ok(value)
        }
    });

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) if err.is_cancelled() => {
            debug!("Abandoning cancelled transaction");
            tx.abort();
            Err(err)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, cause = %err, "Rollback failed");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl<T: Transactioner, S: UserStore> UserServiceTrait for UserService<T, S> {
    #[instrument(skip_all, fields(nickname = %user.nickname))]
    async fn create(&self, cancel: &Cancellation, user: UserEntity) -> Result<UserId, DomainError> {
        validate_user(&user, CREATE_FIELDS)?;

        let record = UserRecord::for_insert(&user, Utc::now());

        let mut tx = begin(self.transactioner.as_ref(), cancel)
            .await
            .context("persist user")?;
        let persisted = cancel.run(self.store.persist(tx.as_runner(), &record)).await;
        let id = finish(cancel, tx, persisted).await.map_err(|err| {
            warn!(error = %err, "Create user failed");
            err.context("persist user")
        })?;

        info!(user_id = %id, "Created user");
        self.notify(UserEvent::Created, id.clone(), None).await;

        Ok(id)
    }

    #[instrument(skip_all, fields(user_id = %id))]
    async fn get(&self, cancel: &Cancellation, id: &UserId) -> Result<UserEntity, DomainError> {
        debug!("Retrieving user");

        let mut run = self.transactioner.runner();
        let record = cancel
            .run(self.store.retrieve(&mut *run, id, false))
            .await
            .with_context(|| format!("retrieve user {:?}", id.as_str()))?;

        Ok(UserEntity::from(record))
    }

    #[instrument(skip_all, fields(user_id = %id))]
    async fn update(
        &self,
        cancel: &Cancellation,
        id: &UserId,
        user: UserEntity,
    ) -> Result<ChangeSet, DomainError> {
        validate_user(&user, UPDATE_FIELDS)?;

        let record = UserRecord::from_entity(&user, Utc::now());
        let context = || format!("update user {:?}", id.as_str());

        let mut tx = begin(self.transactioner.as_ref(), cancel)
            .await
            .with_context(context)?;
        let diffed = cancel
            .run(self.store.update(tx.as_runner(), id, &record))
            .await
            .map(|old| old.changes_to(&record));
        let changes = finish(cancel, tx, diffed).await.map_err(|err| {
            warn!(error = %err, "Update user failed");
            err.context(context())
        })?;

        info!(changed = changes.len(), "Updated user");
        self.notify(UserEvent::Updated, id.clone(), Some(changes.clone()))
            .await;

        Ok(changes)
    }

    #[instrument(skip_all, fields(user_id = %id))]
    async fn delete(&self, cancel: &Cancellation, id: &UserId) -> Result<(), DomainError> {
        let mut run = self.transactioner.runner();
        cancel
            .run(self.store.delete(&mut *run, id))
            .await
            .with_context(|| format!("delete user {:?}", id.as_str()))?;

        info!("Deleted user");
        self.notify(UserEvent::Deleted, id.clone(), None).await;

        Ok(())
    }

    #[instrument(skip_all, fields(limit = page.limit(), offset = page.offset()))]
    async fn list(&self, cancel: &Cancellation, page: Page) -> Result<Vec<UserEntity>, DomainError> {
        let mut run = self.transactioner.runner();
        let records = cancel
            .run(self.store.list(&mut *run, page))
            .await
            .context("list users")?;

        debug!(count = records.len(), "Listed users");
        Ok(records.into_iter().map(UserEntity::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;
    use mockall::predicate::eq;
    use tokio::sync::watch;

    use super::*;
    use crate::domain::user::MockUserNotifier;
    use crate::infrastructure::storage::stub::{StubTransactioner, TxCounts};
    use crate::infrastructure::storage::Runner;
    use crate::infrastructure::user::{FakeUserStore, StoreCall};
    use crate::domain::ErrorKind;

    fn entity() -> UserEntity {
        UserEntity {
            first_name: "f".to_string(),
            last_name: "l".to_string(),
            nickname: "n".to_string(),
            email: "e@mail.com".to_string(),
            country: "X1".to_string(),
            password: "password".to_string(),
        }
    }

    fn updated_entity() -> UserEntity {
        UserEntity {
            first_name: "f2".to_string(),
            last_name: "l2".to_string(),
            nickname: "n2".to_string(),
            email: "e@mail2.com".to_string(),
            country: "X2".to_string(),
            password: String::new(),
        }
    }

    fn stored(entity: &UserEntity, id: &str) -> UserRecord {
        let created = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        UserRecord {
            id: Some(UserId::new(id)),
            ..UserRecord::from_entity(entity, created)
        }
    }

    fn quiet_notifier() -> Arc<MockUserNotifier> {
        let mut notifier = MockUserNotifier::new();
        notifier.expect_notify().never();
        Arc::new(notifier)
    }

    fn service(
        tx: &StubTransactioner,
        store: &FakeUserStore,
        notifier: Arc<MockUserNotifier>,
    ) -> UserService<StubTransactioner, FakeUserStore> {
        UserService::new(Arc::new(tx.clone()), Arc::new(store.clone())).with_notifier(notifier)
    }

    fn counts(begun: usize, committed: usize, rolled_back: usize, pooled: usize) -> TxCounts {
        TxCounts {
            begun,
            committed,
            rolled_back,
            pooled,
            ..TxCounts::default()
        }
    }

    /// Store whose statements never complete, like one stuck behind a lock
    struct BlockedStore;

    #[async_trait]
    impl UserStore for BlockedStore {
        async fn persist(&self, _run: &mut dyn Runner, _user: &UserRecord) -> Result<UserId, DomainError> {
            std::future::pending().await
        }

        async fn retrieve(
            &self,
            _run: &mut dyn Runner,
            _id: &UserId,
            _for_update: bool,
        ) -> Result<UserRecord, DomainError> {
            std::future::pending().await
        }

        async fn update(
            &self,
            _run: &mut dyn Runner,
            _id: &UserId,
            _user: &UserRecord,
        ) -> Result<UserRecord, DomainError> {
            std::future::pending().await
        }

        async fn delete(&self, _run: &mut dyn Runner, _id: &UserId) -> Result<(), DomainError> {
            std::future::pending().await
        }

        async fn list(&self, _run: &mut dyn Runner, _page: Page) -> Result<Vec<UserRecord>, DomainError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_create_commits_and_notifies() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_persist(Ok(UserId::new("1-2-3-4")));

        let mut notifier = MockUserNotifier::new();
        notifier
            .expect_notify()
            .with(eq(UserNotification {
                event: UserEvent::Created,
                id: UserId::new("1-2-3-4"),
                changes: None,
            }))
            .times(1)
            .return_const(());

        let svc = service(&tx, &store, Arc::new(notifier));
        let id = svc.create(&Cancellation::none(), entity()).await.unwrap();

        assert_eq!(id.as_str(), "1-2-3-4");
        assert_eq!(tx.counts(), counts(1, 1, 0, 0));

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        let StoreCall::Persist(record) = &calls[0] else {
            panic!("expected persist, got {:?}", calls[0]);
        };
        assert_eq!(record.password.as_deref(), Some("password"));
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.id.is_none());
    }

    #[tokio::test]
    async fn test_create_not_unique_rolls_back() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new()
            .on_persist(Err(DomainError::not_unique("users_email_key").context("query single")));

        let svc = service(&tx, &store, quiet_notifier());
        let err = svc.create(&Cancellation::none(), entity()).await.unwrap_err();

        assert!(err.is_not_unique());
        assert!(err.to_string().starts_with("persist user: "));
        assert_eq!(tx.counts(), counts(1, 0, 1, 0));
    }

    #[tokio::test]
    async fn test_create_validation_never_reaches_store() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new();

        let svc = service(&tx, &store, quiet_notifier());
        let user = UserEntity {
            email: "bad@mail".to_string(),
            ..entity()
        };
        let err = svc.create(&Cancellation::none(), user).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BadInput);
        let details = &err.validation().unwrap().details;
        assert_eq!(details.len(), 1);
        assert_eq!(details["Email"], "invalid format");

        assert!(store.calls().is_empty());
        assert_eq!(tx.counts(), TxCounts::default());
    }

    #[tokio::test]
    async fn test_create_commit_failure_skips_notification() {
        let tx = StubTransactioner::failing_commit();
        let store = FakeUserStore::new().on_persist(Ok(UserId::new("1")));

        let svc = service(&tx, &store, quiet_notifier());
        let err = svc.create(&Cancellation::none(), entity()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(tx.counts().committed, 0);
    }

    #[tokio::test]
    async fn test_create_cancelled_before_start() {
        let (signal, rx) = watch::channel(false);
        signal.send(true).unwrap();

        let tx = StubTransactioner::new();
        let store = FakeUserStore::new();

        let svc = service(&tx, &store, quiet_notifier());
        let err = svc.create(&Cancellation::new(rx), entity()).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(tx.counts().begun, 0);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_maps_record_without_password() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_retrieve(Ok(stored(&entity(), "1")));

        let svc = service(&tx, &store, quiet_notifier());
        let user = svc.get(&Cancellation::none(), &UserId::new("1")).await.unwrap();

        assert_eq!(
            user,
            UserEntity {
                password: String::new(),
                ..entity()
            }
        );
        assert_eq!(store.calls(), vec![StoreCall::Retrieve(UserId::new("1"), false)]);
        assert_eq!(tx.counts(), counts(0, 0, 0, 1));
    }

    #[tokio::test]
    async fn test_get_not_found_keeps_kind() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_retrieve(Err(DomainError::not_found("no rows")));

        let svc = service(&tx, &store, quiet_notifier());
        let err = svc.get(&Cancellation::none(), &UserId::new("missing")).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("retrieve user \"missing\": "));
    }

    #[tokio::test]
    async fn test_update_reports_every_changed_field() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_update(Ok(stored(&entity(), "1")));

        let mut notifier = MockUserNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.event == UserEvent::Updated && n.changes.as_ref().is_some_and(|c| c.len() == 5))
            .times(1)
            .return_const(());

        let svc = service(&tx, &store, Arc::new(notifier));
        let changes = svc
            .update(&Cancellation::none(), &UserId::new("1"), updated_entity())
            .await
            .unwrap();

        let expected = [
            ("FirstName", "f", "f2"),
            ("LastName", "l", "l2"),
            ("Nickname", "n", "n2"),
            ("Email", "e@mail.com", "e@mail2.com"),
            ("Country", "X1", "X2"),
        ];
        assert_eq!(changes.len(), expected.len());
        for (change, (field, old, new)) in changes.iter().zip(expected) {
            assert_eq!((change.field, change.old.as_str(), change.new.as_str()), (field, old, new));
        }

        assert_eq!(tx.counts(), counts(1, 1, 0, 0));
    }

    #[tokio::test]
    async fn test_update_partial_change() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_update(Ok(stored(&entity(), "1")));

        let mut notifier = MockUserNotifier::new();
        notifier.expect_notify().times(1).return_const(());

        let svc = service(&tx, &store, Arc::new(notifier));
        let user = UserEntity {
            country: "X2".to_string(),
            ..entity()
        };
        let changes = svc.update(&Cancellation::none(), &UserId::new("1"), user).await.unwrap();

        assert_eq!(changes.fields().collect::<Vec<_>>(), vec!["Country"]);

        let calls = store.calls();
        let StoreCall::Update(id, record) = &calls[0] else {
            panic!("expected update");
        };
        assert_eq!(id.as_str(), "1");
        assert!(record.password.is_none());
    }

    #[tokio::test]
    async fn test_update_validation_stops_before_store() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new();

        let svc = service(&tx, &store, quiet_notifier());
        let user = UserEntity {
            nickname: "   ".to_string(),
            ..updated_entity()
        };
        let err = svc
            .update(&Cancellation::none(), &UserId::new("1"), user)
            .await
            .unwrap_err();

        assert!(err.is_bad_input());
        assert_eq!(err.validation().unwrap().details["Nickname"], "blank or empty");
        assert!(store.calls().is_empty());
        assert_eq!(tx.counts().begun, 0);
    }

    #[tokio::test]
    async fn test_update_not_found_rolls_back() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_update(Err(DomainError::not_found("no rows")));

        let svc = service(&tx, &store, quiet_notifier());
        let err = svc
            .update(&Cancellation::none(), &UserId::new("nope"), updated_entity())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("update user \"nope\": "));
        assert_eq!(tx.counts(), counts(1, 0, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_skips_transaction() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_update(Ok(stored(&entity(), "1")));

        let svc = service(&tx, &store, quiet_notifier());
        let cancel = Cancellation::none().with_timeout(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let err = svc
            .update(&cancel, &UserId::new("1"), updated_entity())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(tx.counts().begun, 0);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_observed_after_work_abandons_transaction() {
        let tx = StubTransactioner::new();
        let open = tx.begin().await.unwrap();

        let (signal, rx) = watch::channel(false);
        signal.send(true).unwrap();

        let err = finish(&Cancellation::new(rx), open, Ok(5)).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(
            tx.counts(),
            TxCounts {
                aborted: 1,
                ..counts(1, 0, 0, 0)
            }
        );
    }

    #[tokio::test]
    async fn test_deadline_bounds_transaction_statements() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_persist(Ok(UserId::new("1")));

        let mut notifier = MockUserNotifier::new();
        notifier.expect_notify().times(1).return_const(());

        let svc = service(&tx, &store, Arc::new(notifier));
        let cancel = Cancellation::none().with_timeout(Duration::from_secs(5));

        svc.create(&cancel, entity()).await.unwrap();

        let timeouts = tx.counts().statement_timeouts;
        assert_eq!(timeouts.len(), 1);
        assert!(timeouts[0] > Duration::ZERO && timeouts[0] <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_deadline_leaves_statements_unbounded() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_persist(Ok(UserId::new("1")));

        let mut notifier = MockUserNotifier::new();
        notifier.expect_notify().times(1).return_const(());

        let svc = service(&tx, &store, Arc::new(notifier));
        svc.create(&Cancellation::none(), entity()).await.unwrap();

        assert!(tx.counts().statement_timeouts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_statement_returns_at_deadline() {
        let tx = StubTransactioner::new();
        let svc = UserService::new(Arc::new(tx.clone()), Arc::new(BlockedStore))
            .with_notifier(quiet_notifier());
        let cancel = Cancellation::none().with_timeout(Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        let err = svc.create(&cancel, entity()).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            tx.counts(),
            TxCounts {
                aborted: 1,
                statement_timeouts: vec![Duration::from_millis(300)],
                ..counts(1, 0, 0, 0)
            }
        );
    }

    #[tokio::test]
    async fn test_finish_commits_success() {
        let tx = StubTransactioner::new();
        let open = tx.begin().await.unwrap();

        let value = finish(&Cancellation::none(), open, Ok("done")).await.unwrap();

        assert_eq!(value, "done");
        assert_eq!(tx.counts(), counts(1, 1, 0, 0));
    }

    #[tokio::test]
    async fn test_delete_runs_without_transaction() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_delete(Ok(()));

        let mut notifier = MockUserNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.event == UserEvent::Deleted && n.id.as_str() == "1" && n.changes.is_none())
            .times(1)
            .return_const(());

        let svc = service(&tx, &store, Arc::new(notifier));
        svc.delete(&Cancellation::none(), &UserId::new("1")).await.unwrap();

        assert_eq!(store.calls(), vec![StoreCall::Delete(UserId::new("1"))]);
        assert_eq!(tx.counts(), counts(0, 0, 0, 1));
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new().on_delete(Err(DomainError::not_found("no rows")));

        let svc = service(&tx, &store, quiet_notifier());
        let err = svc.delete(&Cancellation::none(), &UserId::new("x")).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("delete user \"x\": "));
    }

    #[tokio::test]
    async fn test_list_maps_records() {
        let tx = StubTransactioner::new();
        let store = FakeUserStore::new()
            .on_list(Ok(vec![stored(&entity(), "1"), stored(&updated_entity(), "2")]));

        let svc = service(&tx, &store, quiet_notifier());
        let users = svc.list(&Cancellation::none(), Page::new(2, 0)).await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[1].nickname, "n2");
        assert!(users.iter().all(|u| u.password.is_empty()));
        assert_eq!(store.calls(), vec![StoreCall::List(Page::new(2, 0))]);
    }
}
