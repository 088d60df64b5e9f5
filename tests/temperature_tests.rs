use adax::Temperature;

#[test]
fn display_degrees_to_wire() {
    assert_eq!(Temperature::from_celsius(21.0).wire(), 2100);
    assert_eq!(Temperature::from_celsius(21.5).wire(), 2150);
    assert_eq!(Temperature::from_celsius(-3.25).wire(), -325);
}

#[test]
fn wire_to_display_degrees() {
    let t = Temperature::from_wire(1850);
    assert_eq!(t.celsius(), 18.5);
    assert_eq!(t.to_string(), "18.5\u{b0}C");
}

#[test]
fn float_noise_rounds_to_nearest_hundredth() {
    assert_eq!(Temperature::from_celsius(20.1).wire(), 2010);
    assert_eq!(Temperature::from_celsius(19.999).wire(), 2000);
}

#[test]
fn ordering_follows_wire_value() {
    assert!(Temperature::from_wire(1850) < Temperature::from_celsius(21.0));
}
