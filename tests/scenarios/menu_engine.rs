//! Generic menu trees: callbacks, visibility and backtracking.

use std::cell::Cell;
use std::rc::Rc;

use diagmenu::console::ScriptedConsole;
use diagmenu::menu::{shared, MenuOption, MenuTree, Navigator, Shared};
use diagmenu::status::{Status, OPERATION_ALREADY_DONE};

/// Context of a small settings menu.
#[derive(Default)]
struct Settings {
    enabled: bool,
    toggles: u32,
}

fn settings_tree(entries: Rc<Cell<u32>>) -> (MenuTree, Shared<Settings>) {
    let ctx = shared(Settings::default());
    let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
    let root = tree.root();

    let settings = tree
        .add_option(
            root,
            MenuOption::new("Settings")
                .title("Settings menu")
                .on_entry(move |_: &mut Settings, _| {
                    entries.set(entries.get() + 1);
                    Ok(Status::SUCCESS)
                }),
            &ctx,
        )
        .unwrap();
    tree.attach_siblings(
        settings,
        [
            MenuOption::new("Enable")
                .on_entry(|s: &mut Settings, _| {
                    s.enabled = true;
                    s.toggles += 1;
                    Ok(Status::SUCCESS)
                })
                .hidden_when(|s: &Settings| s.enabled),
            MenuOption::new("Disable")
                .on_entry(|s: &mut Settings, _| {
                    s.enabled = false;
                    s.toggles += 1;
                    Ok(Status::SUCCESS)
                })
                .hidden_when(|s: &Settings| !s.enabled),
        ],
        &ctx,
    )
    .unwrap();
    (tree, ctx)
}

#[test]
fn toggling_swaps_visible_options_and_keeps_numbers() {
    let entries = Rc::new(Cell::new(0));
    let (mut tree, ctx) = settings_tree(Rc::clone(&entries));
    let mut console = ScriptedConsole::scripted("1\n1\n2\n99\n99\n");

    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, Status::SUCCESS);
    assert_eq!(ctx.borrow().toggles, 2);
    assert!(!ctx.borrow().enabled);
    // entry runs on the first arrival and after every leaf returns
    assert_eq!(entries.get(), 3);

    let out = console.output();
    assert!(out.contains("Settings menu\n-------------\n1. Enable\n99. Exit Menu\n"));
    assert!(out.contains("Settings menu\n-------------\n2. Disable\n99. Exit Menu\n"));
}

#[test]
fn hidden_option_number_is_rejected() {
    let (mut tree, ctx) = settings_tree(Rc::new(Cell::new(0)));
    let mut console = ScriptedConsole::scripted("1\n2\n99\n99\n");

    Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(ctx.borrow().toggles, 0);
    assert!(console.output().contains("Invalid option\n"));
}

#[test]
fn failed_entry_backtracks_and_sets_final_status() {
    let ctx = shared(());
    let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
    let root = tree.root();
    let locked = tree
        .add_option(
            root,
            MenuOption::new("Locked").on_entry(|_: &mut (), _| Ok(OPERATION_ALREADY_DONE)),
            &ctx,
        )
        .unwrap();
    tree.add_option(locked, MenuOption::new("Unreachable"), &ctx)
        .unwrap();
    tree.add_option(root, MenuOption::new("Fine"), &ctx).unwrap();

    let mut console = ScriptedConsole::scripted("1\n99\n");
    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, OPERATION_ALREADY_DONE);
    assert!(!console.output().contains("Unreachable"));
    assert_eq!(console.output().matches("1. Locked").count(), 2);
}

#[test]
fn exit_callback_status_is_reported() {
    let ctx = shared(());
    let mut tree = MenuTree::new(
        MenuOption::new("")
            .title("Main")
            .on_exit(|_: &mut (), console| {
                writeln!(console, "closing")?;
                Ok(Status(7))
            }),
        &ctx,
    );
    let root = tree.root();
    tree.add_option(root, MenuOption::new("Leaf"), &ctx).unwrap();

    let mut console = ScriptedConsole::scripted("99\n");
    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, Status(7));
    assert!(console.output().ends_with("Enter option: closing\n"));
}

#[test]
fn failed_root_entry_ends_the_session() {
    let ctx = shared(());
    let mut tree = MenuTree::new(
        MenuOption::new("").on_entry(|_: &mut (), _| Ok(Status(1))),
        &ctx,
    );
    let root = tree.root();
    tree.add_option(root, MenuOption::new("Leaf"), &ctx).unwrap();

    let mut console = ScriptedConsole::scripted("1\n");
    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, Status(1));
    assert!(console.output().is_empty());
    assert_eq!(console.remaining_input(), b"1\n");
}

#[test]
fn failed_entry_skips_exit_callback() {
    let exits = Rc::new(Cell::new(0));
    let counted = Rc::clone(&exits);
    let ctx = shared(());
    let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
    let root = tree.root();
    let refused = tree
        .add_option(
            root,
            MenuOption::new("Refused")
                .on_entry(|_: &mut (), _| Ok(Status(3)))
                .on_exit(move |_: &mut (), _| {
                    counted.set(counted.get() + 1);
                    Ok(Status::SUCCESS)
                }),
            &ctx,
        )
        .unwrap();
    tree.add_option(refused, MenuOption::new("Inside"), &ctx)
        .unwrap();

    let mut console = ScriptedConsole::scripted("1\n1\n99\n");
    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, Status(3));
    assert_eq!(exits.get(), 0);
    assert!(!console.output().contains("Inside"));
}

#[test]
fn final_status_is_the_latest_callback() {
    let ctx = shared(());
    let mut tree = MenuTree::new(MenuOption::new("").title("Main"), &ctx);
    let root = tree.root();
    tree.attach_siblings(
        root,
        [
            MenuOption::new("A").on_entry(|_: &mut (), _| Ok(Status::SUCCESS)),
            MenuOption::new("B").on_entry(|_: &mut (), _| Ok(Status(5))),
        ],
        &ctx,
    )
    .unwrap();

    let mut console = ScriptedConsole::scripted("1\n2\n99\n");
    let status = Navigator::new(&mut tree).run(&mut console).unwrap();

    assert_eq!(status, Status(5));
}
