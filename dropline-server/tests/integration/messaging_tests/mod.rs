mod test_room_http_routes;
