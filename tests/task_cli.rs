mod support;

use std::fs;

use predicates::str::contains;
use serde_json::Value;
use support::TestBoard;

#[test]
fn create_then_list_and_show() {
    let board = TestBoard::logged_in();
    let task = board.json(&[
        "task",
        "create",
        "--name",
        "  Write tests ",
        "--description",
        "cover the cli",
    ]);
    assert_eq!(task["id"], 4);
    assert_eq!(task["name"], "Write tests");
    assert_eq!(task["state"], "in queue");
    assert!(task.get("assignedUserId").is_none());

    let list = board.json(&["task", "list"]);
    assert_eq!(list["total"], 4);
    let show = board.json(&["task", "show", "4"]);
    assert_eq!(show["description"], "cover the cli");

    let persisted: Value =
        serde_json::from_str(&board.read_key("tasks").expect("tasks persisted")).expect("json");
    assert_eq!(persisted.as_array().map(Vec::len), Some(4));
    assert_eq!(board.read_key("tasks_next_id").as_deref(), Some("5"));
}

#[test]
fn create_rejects_blank_name_and_unknown_state() {
    let board = TestBoard::logged_in();
    board.json_error(
        &["task", "create", "--name", " ", "--description", "x"],
        2,
    );
    let error = board.json_error(
        &["task", "create", "--name", "a", "--description", "b", "--state", "later"],
        2,
    );
    assert!(error["message"].as_str().unwrap().contains("unknown task state"));
    assert_eq!(board.json(&["task", "stats"])["total"], 3);
}

#[test]
fn assign_pairs_task_and_user() {
    let board = TestBoard::logged_in();
    let assigned = board.json(&["task", "assign", "3", "1"]);
    assert_eq!(assigned["changed"], true);
    assert_eq!(assigned["task"]["state"], "in progress");
    assert_eq!(assigned["task"]["assignedUserId"], 1);
    assert_eq!(assigned["user"]["assignedTaskId"], 3);

    let again = board.json(&["task", "assign", "3", "1"]);
    assert_eq!(again["changed"], false);

    let show = board.json(&["task", "show", "3"]);
    assert_eq!(show["assignedUser"]["name"], "John Doe");
    let user = board.json(&["user", "show", "1"]);
    assert_eq!(user["assignedTask"]["id"], 3);
}

#[test]
fn assignment_rules_are_enforced() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "1"]);

    let busy = board.json_error(&["task", "assign", "2", "1"], 3);
    assert!(busy["message"].as_str().unwrap().contains("working on task 3"));

    let taken = board.json_error(&["task", "assign", "3", "2"], 3);
    assert!(taken["message"].as_str().unwrap().contains("already assigned"));

    let done = board.json_error(&["task", "assign", "1", "2"], 3);
    assert!(done["message"].as_str().unwrap().contains("is done"));

    let missing = board.json_error(&["task", "assign", "3", "9"], 2);
    assert_eq!(missing["details"]["kind"], "user");

    board
        .cmd()
        .args(["task", "assign", "2", "1"])
        .assert()
        .code(3)
        .stderr(contains("taskboard user available"));
}

#[test]
fn create_with_assign_to_pairs_new_task() {
    let board = TestBoard::logged_in();
    let task = board.json(&[
        "task",
        "create",
        "--name",
        "Triage inbox",
        "--description",
        "sort new reports",
        "--assign-to",
        "2",
    ]);
    assert_eq!(task["id"], 4);
    assert_eq!(task["state"], "in progress");
    assert_eq!(task["assignedUserId"], 2);

    let user = board.json(&["user", "show", "2"]);
    assert_eq!(user["assignedTask"]["id"], 4);
}

#[test]
fn create_with_rejected_assignment_keeps_task_unassigned() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "1"]);

    let missing = board.json_error(
        &["task", "create", "--name", "A", "--description", "a", "--assign-to", "9"],
        2,
    );
    assert_eq!(missing["details"]["kind"], "user");

    let busy = board.json_error(
        &["task", "create", "--name", "B", "--description", "b", "--assign-to", "1"],
        3,
    );
    assert!(busy["message"].as_str().unwrap().contains("working on task 3"));

    let created = board.json(&["task", "show", "5"]);
    assert_eq!(created["name"], "B");
    assert_eq!(created["state"], "in queue");
    assert!(created.get("assignedUserId").is_none());
    let user = board.json(&["user", "show", "1"]);
    assert_eq!(user["assignedTask"]["id"], 3);
}

#[test]
fn unassign_requeues_and_frees_user() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "2"]);

    let released = board.json(&["task", "unassign", "3"]);
    assert_eq!(released["changed"], true);
    assert_eq!(released["task"]["state"], "in queue");
    assert!(released["user"].get("assignedTaskId").is_none());

    let noop = board.json(&["task", "unassign", "3"]);
    assert_eq!(noop["changed"], false);
    board.json_error(&["task", "unassign", "42"], 2);

    let available = board.json(&["user", "available"]);
    assert_eq!(available["total"], 3);
}

#[test]
fn edit_respects_assignment() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "1"]);

    board.json_error(&["task", "edit", "3", "--state", "in-queue"], 3);

    let edited = board.json(&["task", "edit", "3", "--state", "done", "--name", "Schema"]);
    assert_eq!(edited["previous_state"], "in progress");
    assert_eq!(edited["task"]["state"], "done");
    assert_eq!(edited["task"]["name"], "Schema");
    assert_eq!(edited["task"]["assignedUserId"], 1);

    board.json_error(&["task", "edit", "3"], 2);
    board.json_error(&["task", "edit", "77", "--name", "ghost"], 2);
}

#[test]
fn delete_releases_assigned_user() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "2"]);

    let deleted = board.json(&["task", "delete", "3"]);
    assert_eq!(deleted["id"], 3);
    assert_eq!(deleted["released_user_id"], 2);

    let user = board.json(&["user", "show", "2"]);
    assert!(user.get("assignedTask").is_none());
    board.json_error(&["task", "show", "3"], 2);
    board.json_error(&["task", "delete", "3"], 2);

    let created = board.json(&["task", "create", "--name", "n", "--description", "d"]);
    assert_eq!(created["id"], 4);
}

#[test]
fn list_filters_combine() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "2", "3"]);

    assert_eq!(board.json(&["task", "list", "--state", "done"])["total"], 1);
    assert_eq!(board.json(&["task", "list", "--unassigned"])["total"], 2);
    let mine = board.json(&["task", "list", "--assigned-to", "3"]);
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["tasks"][0]["id"], 2);
    assert_eq!(
        board.json(&["task", "list", "--search", "DATABASE"])["total"],
        1
    );

    board
        .cmd()
        .args(["task", "list"])
        .assert()
        .success()
        .stdout(contains("(user: Bob Johnson #3)"));
}

#[test]
fn stats_count_states_and_assignment() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "1"]);

    let stats = board.json(&["task", "stats"]);
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["inQueue"], 0);
    assert_eq!(stats["inProgress"], 2);
    assert_eq!(stats["done"], 1);
    assert_eq!(stats["assigned"], 1);
    assert_eq!(stats["unassigned"], 2);
}

#[test]
fn export_then_import_round_trip() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "1"]);

    let raw = board
        .cmd()
        .args(["task", "export"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let mut tasks: Vec<Value> = serde_json::from_slice(&raw).expect("task array");
    assert_eq!(tasks.len(), 3);
    tasks[0]["id"] = Value::from(20);

    let file = board.path().join("tasks-import.json");
    fs::write(&file, serde_json::to_string(&tasks).unwrap()).unwrap();
    let imported = board.json(&["task", "import", file.to_str().unwrap()]);
    assert_eq!(imported["imported"], 3);
    assert_eq!(imported["next_id"], 21);

    // pointers are dropped on import
    assert_eq!(board.json(&["user", "list", "--with-task"])["total"], 0);
    let task = board.json(&["task", "show", "3"]);
    assert!(task.get("assignedUserId").is_none());
    assert_eq!(task["state"], "in queue");
    board.cmd().args(["doctor"]).assert().success();
}

#[test]
fn export_to_file_reports_path() {
    let board = TestBoard::logged_in();
    let file = board.path().join("out").join("tasks.json");
    fs::create_dir_all(file.parent().unwrap()).unwrap();

    let exported = board.json(&["task", "export", "--output", file.to_str().unwrap()]);
    assert_eq!(exported["total"], 3);
    let written: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).expect("array");
    assert_eq!(written.len(), 3);
}

#[test]
fn import_rejects_non_array() {
    let board = TestBoard::logged_in();
    let file = board.path().join("bad.json");
    fs::write(&file, "{\"id\": 1}").unwrap();

    board.json_error(&["task", "import", file.to_str().unwrap()], 2);
    assert_eq!(board.json(&["task", "stats"])["total"], 3);
}

#[test]
fn clear_removes_tasks_but_keeps_ids_moving() {
    let board = TestBoard::logged_in();
    board.json(&["task", "assign", "3", "1"]);

    let cleared = board.json(&["task", "clear"]);
    assert_eq!(cleared["removed"], 3);
    assert_eq!(board.json(&["task", "list"])["total"], 0);
    assert_eq!(board.json(&["user", "available"])["total"], 3);

    let task = board.json(&["task", "create", "--name", "fresh", "--description", "start"]);
    assert_eq!(task["id"], 4);
}

#[test]
fn events_are_written_as_jsonl() {
    let board = TestBoard::logged_in();
    let events = board.path().join("events.jsonl");
    let events_arg = events.to_str().unwrap();

    board
        .cmd()
        .args(["task", "create", "--name", "evented", "--description", "d"])
        .args(["--events", events_arg])
        .assert()
        .success();
    board
        .cmd()
        .args(["task", "assign", "4", "2", "--events", events_arg])
        .assert()
        .success();

    let lines: Vec<Value> = fs::read_to_string(&events)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("event line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event"], "task_created");
    assert_eq!(lines[0]["actor"], "admin");
    assert_eq!(lines[0]["schema_version"], "taskboard.event.v1");
    assert_eq!(lines[1]["event"], "task_assigned");
    assert_eq!(lines[1]["data"]["user"]["id"], 2);
}

#[test]
fn events_to_stdout_replace_normal_output() {
    let board = TestBoard::logged_in();
    let output = board
        .cmd()
        .args(["user", "create", "--name", "Streamer", "--events", "-", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let event: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["event"], "user_created");
    assert_eq!(event["data"]["name"], "Streamer");
}
