#[rocket::launch]
fn rocket() -> _ {
    let rocket = linkdock_api::rocket();
    log::info!("Starting Linkdock API Server");
    rocket
}
