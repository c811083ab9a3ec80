//! Tracker program: todo lists and their todos.
//!
//! Both record types start with the authority, so one memcmp at
//! [`AUTHORITY_OFFSET`] selects everything an identity owns.

use super::{decode_account, instruction_data, AccountMeta, Instruction, ProgramAccount};
use crate::error::{ClientError, Result};
use crate::types::{RecordAddress, RecordFilter, SYSTEM_PROGRAM_ID};
use borsh::{BorshDeserialize, BorshSerialize};

/// Offset of `authority` in both record types.
pub const AUTHORITY_OFFSET: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TodoList {
    pub authority: RecordAddress,
    pub name: String,
    pub bump: u8,
    pub created_at: i64,
    pub updated_at: i64,
    pub quantity_of_todos: u16,
}

impl ProgramAccount for TodoList {
    const NAME: &'static str = "TodoList";
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Todo {
    pub authority: RecordAddress,
    pub todo_list: RecordAddress,
    pub body: String,
    pub checked: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProgramAccount for Todo {
    const NAME: &'static str = "Todo";
}

/// Any record the tracker program owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerAccount {
    TodoList(TodoList),
    Todo(Todo),
}

impl TrackerAccount {
    /// Decode by discriminator.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if TodoList::is_type_of(data) {
            decode_account(data).map(TrackerAccount::TodoList)
        } else if Todo::is_type_of(data) {
            decode_account(data).map(TrackerAccount::Todo)
        } else {
            Err(ClientError::decode(
                "TrackerAccount",
                format!(
                    "unknown discriminator {}",
                    hex::encode(data.get(..8).unwrap_or(data))
                ),
            ))
        }
    }
}

/// Filter selecting every tracker record `authority` owns.
pub fn owned_by(authority: &RecordAddress) -> RecordFilter {
    RecordFilter::address_at(AUTHORITY_OFFSET, authority)
}

/// `todo_list` is a fresh record and must co-sign.
pub fn create_todo_list(
    program_id: RecordAddress,
    todo_list: RecordAddress,
    authority: RecordAddress,
    name: &str,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "create_todo_list",
        accounts: vec![
            AccountMeta::new("todo_list", todo_list, true),
            AccountMeta::new("authority", authority, true),
            AccountMeta::new_readonly("system_program", SYSTEM_PROGRAM_ID, false),
        ],
        data: instruction_data("create_todo_list", &name.to_string())?,
    })
}

pub fn delete_todo_list(
    program_id: RecordAddress,
    todo_list: RecordAddress,
    authority: RecordAddress,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "delete_todo_list",
        accounts: vec![
            AccountMeta::new_readonly("authority", authority, true),
            AccountMeta::new("todo_list", todo_list, false),
        ],
        data: instruction_data("delete_todo_list", &())?,
    })
}

/// `todo` is a fresh record and must co-sign.
pub fn create_todo(
    program_id: RecordAddress,
    todo_list: RecordAddress,
    todo: RecordAddress,
    authority: RecordAddress,
    body: &str,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "create_todo",
        accounts: vec![
            AccountMeta::new("todo_list", todo_list, false),
            AccountMeta::new("authority", authority, true),
            AccountMeta::new("todo", todo, true),
            AccountMeta::new_readonly("system_program", SYSTEM_PROGRAM_ID, false),
        ],
        data: instruction_data("create_todo", &body.to_string())?,
    })
}

pub fn toggle_todo(
    program_id: RecordAddress,
    todo: RecordAddress,
    authority: RecordAddress,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "toggle_todo",
        accounts: vec![
            AccountMeta::new_readonly("authority", authority, true),
            AccountMeta::new("todo", todo, false),
        ],
        data: instruction_data("toggle_todo", &())?,
    })
}

pub fn delete_todo(
    program_id: RecordAddress,
    todo_list: RecordAddress,
    todo: RecordAddress,
    authority: RecordAddress,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "delete_todo",
        accounts: vec![
            AccountMeta::new("todo_list", todo_list, false),
            AccountMeta::new_readonly("authority", authority, true),
            AccountMeta::new("todo", todo, false),
        ],
        data: instruction_data("delete_todo", &())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::encode_account;

    fn todo(list: RecordAddress) -> Todo {
        Todo {
            authority: RecordAddress([1; 32]),
            todo_list: list,
            body: "milk".to_string(),
            checked: false,
            created_at: 10,
            updated_at: 10,
        }
    }

    #[test]
    fn test_authority_offset_matches_layout() {
        let list = RecordAddress([2; 32]);
        let data = encode_account(&todo(list)).unwrap();
        assert!(owned_by(&RecordAddress([1; 32])).matches(&data));
        assert!(!owned_by(&list).matches(&data));
    }

    #[test]
    fn test_decode_dispatches_on_discriminator() {
        let list = TodoList {
            authority: RecordAddress([1; 32]),
            name: "groceries".to_string(),
            bump: 0,
            created_at: 1,
            updated_at: 2,
            quantity_of_todos: 3,
        };
        let decoded = TrackerAccount::decode(&encode_account(&list).unwrap()).unwrap();
        assert_eq!(decoded, TrackerAccount::TodoList(list));

        let item = todo(RecordAddress([2; 32]));
        let decoded = TrackerAccount::decode(&encode_account(&item).unwrap()).unwrap();
        assert_eq!(decoded, TrackerAccount::Todo(item));

        assert!(TrackerAccount::decode(&[0; 64]).is_err());
    }

    #[test]
    fn test_create_todo_signers() {
        let ix = create_todo(
            RecordAddress([9; 32]),
            RecordAddress([2; 32]),
            RecordAddress([3; 32]),
            RecordAddress([1; 32]),
            "milk",
        )
        .unwrap();
        let signers: Vec<_> = ix.signers().copied().collect();
        assert_eq!(signers, vec![RecordAddress([1; 32]), RecordAddress([3; 32])]);
        // borsh string: u32 length prefix then bytes
        assert_eq!(&ix.data[8..12], &4u32.to_le_bytes());
        assert_eq!(&ix.data[12..], b"milk");
    }
}
