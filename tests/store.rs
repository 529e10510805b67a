use std::sync::{Arc, Mutex};

use taskboard::entity::Entity;
use taskboard::error::Error;
use taskboard::storage::{KeyValueStore, MemoryStore};
use taskboard::store::{EntityStore, StoreOptions};
use taskboard::task::{CreateTaskRequest, Task, TaskState, TaskStore, UpdateTaskRequest};
use taskboard::user::{CreateUserRequest, UpdateUserRequest, User, UserStore};

fn no_seed() -> StoreOptions {
    StoreOptions {
        seed_demo_data: false,
    }
}

fn task_request(name: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        name: name.to_string(),
        description: format!("{name} description"),
        state: TaskState::InQueue,
    }
}

fn empty_tasks() -> TaskStore {
    EntityStore::open(Arc::new(MemoryStore::new()), no_seed()).expect("open task store")
}

#[test]
fn seeded_store_has_demo_records() -> Result<(), Box<dyn std::error::Error>> {
    let kv = Arc::new(MemoryStore::new());
    let tasks: TaskStore = EntityStore::open(kv.clone(), StoreOptions::default())?;
    let users: UserStore = EntityStore::open(kv.clone(), StoreOptions::default())?;

    assert_eq!(tasks.len(), 3);
    assert_eq!(users.len(), 3);
    assert_eq!(tasks.next_id(), 4);
    assert_eq!(tasks.get(2).map(|t| t.state), Some(TaskState::InProgress));
    assert!(kv.get("tasks")?.is_some());
    assert!(kv.get("users")?.is_some());
    Ok(())
}

#[test]
fn ids_keep_increasing_after_delete() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    let first = tasks.create(&task_request("first"))?;
    let second = tasks.create(&task_request("second"))?;
    assert!(tasks.delete(second.id)?);
    let third = tasks.create(&task_request("third"))?;

    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(third.id, 3);
    Ok(())
}

#[test]
fn create_trims_and_stamps() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    let task = tasks.create(&CreateTaskRequest {
        name: "  Write docs  ".to_string(),
        description: "\tall of them\n".to_string(),
        state: TaskState::InQueue,
    })?;

    assert_eq!(task.name, "Write docs");
    assert_eq!(task.description, "all of them");
    assert_eq!(task.created_date, task.modified_date);
    assert!(task.assigned_user_id.is_none());
    Ok(())
}

#[test]
fn create_rejects_blank_fields() {
    let tasks = empty_tasks();
    let err = tasks
        .create(&CreateTaskRequest {
            name: "   ".to_string(),
            description: "x".to_string(),
            state: TaskState::InQueue,
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(tasks.is_empty());
    assert_eq!(tasks.next_id(), 1);
}

#[test]
fn update_missing_id_is_not_found_sentinel() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    tasks.create(&task_request("only"))?;
    let before = tasks.all();

    let result = tasks.update(&UpdateTaskRequest {
        id: 42,
        name: "ghost".to_string(),
        description: "ghost".to_string(),
        state: TaskState::Done,
    })?;

    assert!(result.is_none());
    assert_eq!(tasks.all(), before);
    Ok(())
}

#[test]
fn update_replaces_in_place_and_refreshes_stamp() -> Result<(), Box<dyn std::error::Error>> {
    let kv = Arc::new(MemoryStore::new());
    let users: UserStore = EntityStore::open(kv, StoreOptions::default())?;
    let seeded = users.get(2).expect("seed user");

    let updated = users
        .update(&UpdateUserRequest {
            id: 2,
            name: " Jane Q. Smith ".to_string(),
        })?
        .expect("user exists");

    assert_eq!(updated.name, "Jane Q. Smith");
    assert_eq!(updated.created_date, seeded.created_date);
    assert!(updated.modified_date > seeded.modified_date);
    assert_eq!(users.all().iter().position(|u| u.id == 2), Some(1));
    Ok(())
}

#[test]
fn delete_missing_id_returns_false() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    assert!(!tasks.delete(7)?);
    Ok(())
}

#[test]
fn subscribers_get_current_value_then_each_mutation() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = tasks.subscribe(move |all: &[Task]| sink.lock().unwrap().push(all.len()));

    let task = tasks.create(&task_request("a"))?;
    tasks.create(&task_request("b"))?;
    tasks.delete(task.id)?;
    assert!(subscription.unsubscribe());
    tasks.create(&task_request("c"))?;

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 1]);
    Ok(())
}

#[test]
fn subscribe_by_id_follows_one_record() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    let names: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    tasks.subscribe_by_id(1, move |task: Option<&Task>| {
        sink.lock().unwrap().push(task.map(|t| t.name.clone()))
    });

    tasks.create(&task_request("watched"))?;
    tasks.update(&UpdateTaskRequest {
        id: 1,
        name: "renamed".to_string(),
        description: "d".to_string(),
        state: TaskState::InQueue,
    })?;
    tasks.delete(1)?;

    assert_eq!(
        *names.lock().unwrap(),
        vec![
            None,
            Some("watched".to_string()),
            Some("renamed".to_string()),
            None
        ]
    );
    Ok(())
}

#[test]
fn callbacks_may_read_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = Arc::new(empty_tasks());
    let observed = Arc::new(Mutex::new(Vec::new()));
    let (store, sink) = (Arc::clone(&tasks), Arc::clone(&observed));
    tasks.subscribe(move |_: &[Task]| sink.lock().unwrap().push(store.next_id()));

    tasks.create(&task_request("a"))?;
    assert_eq!(*observed.lock().unwrap(), vec![1, 2]);
    Ok(())
}

#[test]
fn quota_exhaustion_keeps_created_record_in_memory() {
    let kv = Arc::new(MemoryStore::with_quota(64));
    let tasks: TaskStore = EntityStore::open(kv.clone(), no_seed()).expect("open");
    let received = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&received);
    tasks.subscribe(move |all: &[Task]| *sink.lock().unwrap() = all.len());

    let err = tasks
        .create(&CreateTaskRequest {
            name: "a name long enough".to_string(),
            description: "to blow through a sixty-four byte quota".to_string(),
            state: TaskState::InQueue,
        })
        .unwrap_err();

    assert!(matches!(err, Error::QuotaExceeded { .. }));
    assert_eq!(tasks.len(), 1);
    assert_eq!(*received.lock().unwrap(), 1);
    assert_eq!(kv.get("tasks").unwrap().as_deref(), Some("[]"));
}

#[test]
fn delete_persistence_failure_leaves_collection_unchanged() {
    let kv = Arc::new(MemoryStore::with_quota(4096));
    let users: UserStore = EntityStore::open(kv.clone(), StoreOptions::default()).expect("open");
    // leave no room for the next write of `users`
    kv.set("users", "").expect("empty value fits");
    let used = kv.used_bytes();
    kv.set("filler", &"x".repeat(4096 - used - "filler".len()))
        .expect("filler fits");

    assert!(!users.delete(3).expect("sentinel, not error"));
    assert_eq!(users.len(), 3);
}

#[test]
fn user_holding_task_cannot_be_deleted() -> Result<(), Box<dyn std::error::Error>> {
    let kv = Arc::new(MemoryStore::new());
    let users: UserStore = EntityStore::open(kv.clone(), no_seed())?;
    let user = users.create(&CreateUserRequest {
        name: "Holder".to_string(),
    })?;
    let mut held = user.clone();
    held.assigned_task_id = Some(9);
    users.import(vec![held])?;

    assert!(!users.delete(user.id)?);
    assert_eq!(users.len(), 1);
    Ok(())
}

#[test]
fn import_raises_counter_to_max_plus_one() -> Result<(), Box<dyn std::error::Error>> {
    let kv = Arc::new(MemoryStore::new());
    let tasks: TaskStore = EntityStore::open(kv.clone(), no_seed())?;
    let mut records = Task::seed();
    records[2].id = 40;
    tasks.import(records)?;

    assert_eq!(tasks.next_id(), 41);
    assert_eq!(kv.get("tasks_next_id")?.as_deref(), Some("41"));
    assert_eq!(tasks.create(&task_request("next"))?.id, 41);
    Ok(())
}

#[test]
fn import_of_fewer_records_keeps_counter() -> Result<(), Box<dyn std::error::Error>> {
    let tasks = empty_tasks();
    for name in ["a", "b", "c", "d", "e"] {
        tasks.create(&task_request(name))?;
    }
    let first = tasks.get(1).expect("task 1");
    tasks.import(vec![first])?;

    assert_eq!(tasks.next_id(), 6);
    assert_eq!(tasks.create(&task_request("after import"))?.id, 6);
    Ok(())
}

#[test]
fn import_rejects_duplicate_ids() {
    let tasks = empty_tasks();
    let mut records = Task::seed();
    records[1].id = 1;
    assert!(matches!(
        tasks.import(records),
        Err(Error::InvalidArgument(_))
    ));
    assert!(tasks.is_empty());
}

#[test]
fn clear_keeps_counter() -> Result<(), Box<dyn std::error::Error>> {
    let kv = Arc::new(MemoryStore::new());
    let users: UserStore = EntityStore::open(kv, StoreOptions::default())?;
    assert!(users.clear()?);
    assert!(users.is_empty());
    let user = users.create(&CreateUserRequest {
        name: "After clear".to_string(),
    })?;
    assert_eq!(user.id, 4);
    assert_eq!(User::KIND, "user");
    Ok(())
}
