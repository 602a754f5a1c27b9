use app_config::AppConfig;

#[test]
fn test_load_default_config() {
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.kafka_topic, "student_system_order.events");
    assert_eq!(cfg.http_max_retry, 5);
}
