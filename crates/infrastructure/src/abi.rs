//! ToDoListコントラクトのABIスキーマとデコーダー

use alloy_primitives::U256;
use alloy_sol_types::{sol, SolCall};
use domain::{TodoId, TodoRecord};
use shared::AppError;

sol! {
    struct Todo {
        uint256 id;
        string name;
        string description;
        uint256 deadline;
        bool completed;
        bool deleted;
    }

    function getTodos(address owner) external view returns (Todo[] memory);
    function createTodo(string memory name, string memory description, uint256 deadline) external;
    function toggleCompleted(uint256 id) external;
    // デプロイ済みコントラクトでの綴りに合わせる
    function deleteToDo(uint256 id) external;
}

/// `getTodos` の戻り値をTodoRecordの列に変換
///
/// 1件でも変換に失敗した場合は全体をエラーとし、部分的な結果は返さない。
pub fn decode_todos(data: &[u8]) -> Result<Vec<TodoRecord>, AppError> {
    let decoded = getTodosCall::abi_decode_returns(data, true)
        .map_err(|e| AppError::Decode(format!("getTodos returned malformed data: {e}")))?;

    decoded._0.into_iter().map(into_record).collect()
}

fn into_record(todo: Todo) -> Result<TodoRecord, AppError> {
    let deadline = u64::try_from(todo.deadline).map_err(|_| {
        AppError::Decode(format!(
            "deadline of todo {} does not fit in u64: {}",
            todo.id, todo.deadline
        ))
    })?;

    Ok(TodoRecord {
        id: TodoId::new(todo.id),
        name: todo.name,
        description: todo.description,
        deadline,
        completed: todo.completed,
        deleted: todo.deleted,
    })
}

impl From<&TodoRecord> for Todo {
    fn from(record: &TodoRecord) -> Self {
        Todo {
            id: record.id.value(),
            name: record.name.clone(),
            description: record.description.clone(),
            deadline: U256::from(record.deadline),
            completed: record.completed,
            deleted: record.deleted,
        }
    }
}
