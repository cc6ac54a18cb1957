//! Integration tests for the relations view and workflow checks.

mod common;

use std::collections::BTreeMap;

use common::{
    alice, create_tickets, create_with, disk_env, execute_raw, memory_env, resolve, set_field,
};
use ticketrels::Error;
use ticketrels::domain::{
    FieldError, PARENTS_FIELD, REFS_FIELD, TicketFields, TicketId, TicketUpdate,
};
use ticketrels::host::{Environment, Request};
use ticketrels::web::{Inline, ReferenceRow, TicketPage};

fn id(n: i64) -> TicketId {
    TicketId::new(n)
}

fn view(env: &Environment, ticket: TicketId) -> TicketPage {
    let req = alice().with_path(format!("/ticket/{ticket}"));
    env.ticket_page(&req, ticket).expect("failed to build page")
}

fn link_ids(inlines: &[Inline]) -> Vec<TicketId> {
    inlines
        .iter()
        .filter_map(Inline::link)
        .map(|link| link.id)
        .collect()
}

#[test]
fn page_lists_children_depth_first() {
    let env = memory_env();
    create_tickets(&env, 4);
    set_field(&env, id(3), PARENTS_FIELD, "1");
    set_field(&env, id(2), PARENTS_FIELD, "1");
    set_field(&env, id(4), PARENTS_FIELD, "2");

    let page = view(&env, id(1));
    let relations = page.relations.expect("ticket page should have relations");

    let rows: Vec<(TicketId, usize, usize)> = relations
        .children
        .iter()
        .map(|row| (row.id, row.depth, row.indent_px))
        .collect();
    assert_eq!(rows, vec![(id(2), 0, 0), (id(4), 1, 15), (id(3), 0, 0)]);
    assert_eq!(relations.children[0].href, "/ticket/2");
    assert_eq!(relations.children[0].summary, "Ticket 2");
}

#[test]
fn parents_field_renders_existing_tickets_only() {
    let (dir, env) = disk_env();
    create_tickets(&env, 2);
    set_field(&env, id(2), PARENTS_FIELD, "1");
    execute_raw(
        dir.path(),
        "UPDATE ticket_custom SET value = '1, 77' WHERE ticket = 2 AND name = 'parents';",
    );

    let page = view(&env, id(2));

    assert_eq!(link_ids(&page.rendered_fields[PARENTS_FIELD]), vec![id(1)]);
    let link = page.rendered_fields[PARENTS_FIELD][0].link().unwrap();
    assert_eq!(link.status, "new");
    assert_eq!(link.title, "Ticket 1");
}

#[test]
fn reference_table_marks_missing_tickets() {
    let (dir, env) = disk_env();
    create_tickets(&env, 2);
    set_field(&env, id(1), REFS_FIELD, "2");
    execute_raw(
        dir.path(),
        "UPDATE ticket_custom SET value = '2, 99' WHERE ticket = 1 AND name = 'refs';",
    );

    let relations = view(&env, id(1)).relations.unwrap();

    assert_eq!(relations.references.len(), 2);
    assert!(matches!(
        &relations.references[0],
        ReferenceRow::Found { link, summary } if link.id == id(2) && summary == "Ticket 2"
    ));
    assert!(matches!(
        &relations.references[1],
        ReferenceRow::Missing { id: missing, placeholder }
            if *missing == id(99) && placeholder == "#99 ticket not found"
    ));
}

#[test]
fn add_links_copy_ticket_fields() {
    let env = memory_env();
    let mut fields = TicketFields::new("Epic");
    fields.component = "core".to_string();
    fields.owner = "bob smith".to_string();
    env.create_ticket(&alice(), fields).unwrap();

    let relations = view(&env, id(1)).relations.unwrap();

    assert_eq!(relations.add_child.as_deref(), Some("/newticket?parents=1"));
    assert_eq!(
        relations.add_reference.as_deref(),
        Some("/newticket?refs=1&component=core&owner=bob%20smith")
    );
}

#[test]
fn add_links_respect_permission_and_status() {
    let env = memory_env();
    create_tickets(&env, 1);

    let req = Request::new("guest")
        .with_path("/ticket/1")
        .with_create_permission(false);
    let relations = env.ticket_page(&req, id(1)).unwrap().relations.unwrap();
    assert!(relations.add_child.is_none());
    assert!(relations.add_reference.is_none());

    set_field(&env, id(1), "status", "closed");
    let relations = view(&env, id(1)).relations.unwrap();
    assert!(relations.add_child.is_none());
    assert!(relations.add_reference.is_some());
}

#[test]
fn other_paths_are_not_filtered() {
    let env = memory_env();
    create_tickets(&env, 2);
    set_field(&env, id(2), PARENTS_FIELD, "1");

    let page = env
        .ticket_page(&alice().with_path("/timeline"), id(2))
        .unwrap();

    assert!(page.relations.is_none());
    assert!(page.rendered_fields.is_empty());
}

#[test]
fn new_ticket_form_links_prefilled_parents() {
    let env = memory_env();
    create_tickets(&env, 1);
    let mut fields = TicketFields::new("");
    fields.set(PARENTS_FIELD, "1");

    let page = env
        .new_ticket_page(&alice().with_path("/newticket"), fields)
        .unwrap();

    assert_eq!(link_ids(&page.rendered_fields[PARENTS_FIELD]), vec![id(1)]);
    assert!(page.relations.is_none());
}

#[test]
fn history_shows_added_and_removed_references() {
    let env = memory_env();
    create_tickets(&env, 3);
    set_field(&env, id(1), REFS_FIELD, "2");
    set_field(&env, id(1), REFS_FIELD, "2, 3");
    set_field(&env, id(1), REFS_FIELD, "3");

    let page = view(&env, id(1));
    let rendered: Vec<(String, Vec<TicketId>)> = page
        .changes
        .iter()
        .filter_map(|group| group.fields.get(REFS_FIELD))
        .filter_map(|change| change.rendered.as_ref())
        .map(|list| (list.action.clone(), link_ids(&list.links)))
        .collect();

    assert_eq!(
        rendered,
        vec![
            ("added".to_string(), vec![id(2)]),
            ("added".to_string(), vec![id(3)]),
            ("removed".to_string(), vec![id(2)]),
        ]
    );
}

#[test]
fn cyclic_children_terminate() {
    let (dir, env) = disk_env();
    create_tickets(&env, 3);
    execute_raw(
        dir.path(),
        "INSERT INTO ticketrels (oneself, relations, ticket) VALUES (1, 'child', 2);
         INSERT INTO ticketrels (oneself, relations, ticket) VALUES (2, 'child', 3);
         INSERT INTO ticketrels (oneself, relations, ticket) VALUES (3, 'child', 1);",
    );

    let children: Vec<TicketId> = view(&env, id(1))
        .relations
        .unwrap()
        .children
        .iter()
        .map(|row| row.id)
        .collect();

    assert_eq!(children, vec![id(2), id(3)]);
}

#[test]
fn resolving_parent_with_open_child_is_refused() {
    let env = memory_env();
    create_tickets(&env, 2);
    set_field(&env, id(2), PARENTS_FIELD, "1");

    let Err(Error::Validation(errors)) = resolve(&env, id(1)) else {
        panic!("resolve should be refused");
    };
    assert_eq!(
        errors,
        vec![FieldError::form("Child ticket #2 has not been closed yet")]
    );

    resolve(&env, id(2)).unwrap();
    let parent = resolve(&env, id(1)).unwrap();
    assert_eq!(parent.fields.status, "closed");
}

#[test]
fn reopening_child_of_closed_parent_is_refused() {
    let env = memory_env();
    create_tickets(&env, 2);
    set_field(&env, id(2), PARENTS_FIELD, "1");
    resolve(&env, id(2)).unwrap();
    resolve(&env, id(1)).unwrap();

    let reopen = TicketUpdate::new()
        .set("status", "reopened")
        .set("resolution", "");
    let result = env.update_ticket(&alice().with_action("reopen"), id(2), &reopen);

    let Err(Error::Validation(errors)) = result else {
        panic!("reopen should be refused");
    };
    assert!(errors.contains(&FieldError::form("Parent ticket #1 is closed")));
}

#[test]
fn query_cells_render_links_and_placeholders() {
    let env = memory_env();
    create_tickets(&env, 1);
    let row = BTreeMap::from([
        (PARENTS_FIELD.to_string(), "1, 99".to_string()),
        (REFS_FIELD.to_string(), "n/a".to_string()),
        ("summary".to_string(), "Ticket 5".to_string()),
    ]);

    let cells = env.render_query_row(&row).unwrap();

    assert_eq!(cells.len(), 2);
    assert_eq!(link_ids(&cells[PARENTS_FIELD]), vec![id(1)]);
    assert_eq!(cells[PARENTS_FIELD][1], Inline::text("#99"));
    assert_eq!(cells[REFS_FIELD], vec![Inline::text("n/a")]);
}

#[test]
fn query_cells_skip_words_between_ids() {
    let env = memory_env();
    create_tickets(&env, 3);
    let row = BTreeMap::from([(REFS_FIELD.to_string(), "2, 3, (see wiki)".to_string())]);

    let cells = env.render_query_row(&row).unwrap();

    assert_eq!(cells[REFS_FIELD].len(), 2);
    assert_eq!(link_ids(&cells[REFS_FIELD]), vec![id(2), id(3)]);
}

#[test]
fn page_serializes_for_templates() {
    let env = memory_env();
    create_tickets(&env, 2);
    create_with(&env, "Child", PARENTS_FIELD, "1");

    let json = serde_json::to_value(view(&env, id(1))).unwrap();

    assert_eq!(json["relations"]["children"][0]["id"], 3);
    assert_eq!(json["relations"]["children"][0]["type"], "");
    assert_eq!(json["fields"]["status"], "new");
}
