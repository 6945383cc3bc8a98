use rsftp::{ConnectionOptions, FtpClient};

fn main() {
    let mut client = FtpClient::new(ConnectionOptions {
        server_host: "127.0.0.1".to_string(),
        username: "anonymous".to_string(),
        password: "".to_string(),
        use_tls: true,
        ..Default::default()
    });

    let result = client
        .connect()
        .and_then(|_| client.login())
        .and_then(|_| client.list(None));

    match result {
        Ok(dir) => {
            for file in dir.lines() {
                println!("{}", file);
            }
        }
        Err(err) => println!("Error: {:?}", err),
    }

    let _ = client.close();
}
