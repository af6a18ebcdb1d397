use avatar_api::router::ApiDoc;
use utoipa::OpenApi;

/// Generates the OpenAPI document for the avatar service and writes it to a file.
fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let document_json = api_doc.to_pretty_json()?;
    std::fs::write(path, document_json)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    write_document(ApiDoc::openapi(), &path)?;
    println!("OpenAPI document written to {}", path);
    Ok(())
}
