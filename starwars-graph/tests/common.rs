use std::sync::Arc;

use serde_json_bytes::Value;
use starwars_graph::graphql::Request;
use starwars_graph::graphql::Response;
use starwars_graph::Executor;
use starwars_graph::InMemoryStore;

pub fn executor() -> Executor {
    Executor::new(Arc::new(
        InMemoryStore::starwars().expect("the Star Wars dataset must load"),
    ))
}

pub fn execute(query: &str) -> Response {
    executor().execute(&Request::builder().query(query).build())
}

pub fn execute_with_variables(query: &str, variables: Value) -> Response {
    let Value::Object(variables) = variables else {
        panic!("variables must be an object");
    };
    executor().execute(&Request::builder().query(query).variables(variables).build())
}

pub fn to_value(response: &Response) -> Value {
    serde_json_bytes::to_value(response).expect("responses always serialize")
}
